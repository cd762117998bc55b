use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::Error;
use crate::executor::RequestExecutor;
use crate::request::RequestOptions;

/// One or more permission names, the way callers naturally hold them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    pub fn names(&self) -> &[String] {
        &self.0
    }
}

impl From<&str> for Permissions {
    fn from(permission: &str) -> Self {
        Self(vec![permission.to_owned()])
    }
}

impl From<String> for Permissions {
    fn from(permission: String) -> Self {
        Self(vec![permission])
    }
}

impl From<Vec<String>> for Permissions {
    fn from(permissions: Vec<String>) -> Self {
        Self(permissions)
    }
}

impl From<&[&str]> for Permissions {
    fn from(permissions: &[&str]) -> Self {
        Self(permissions.iter().map(|name| (*name).to_owned()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Permissions {
    fn from(permissions: [&str; N]) -> Self {
        Self(permissions.iter().map(|name| (*name).to_owned()).collect())
    }
}

impl FromIterator<String> for Permissions {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Access-policy surface of one resource, addressed by its full path
/// (for example `projects/demo/topics/events`). Requests flow through the
/// same pipeline as everything else, so they authorize, normalize, and
/// retry identically.
pub struct IamClient {
    executor: Arc<RequestExecutor>,
    resource: String,
}

impl IamClient {
    pub(crate) fn new(executor: Arc<RequestExecutor>, resource: String) -> Self {
        Self { executor, resource }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Fetches the resource's current access policy.
    pub async fn get_policy(&self) -> Result<Value, Error> {
        let options = RequestOptions::get(format!("{}:getIamPolicy", self.resource));
        let success = self.executor.execute(options).await?;
        Ok(success.body.into_json().unwrap_or(Value::Null))
    }

    /// Replaces the resource's access policy. The policy must be a JSON
    /// object; anything else is rejected before any request is issued.
    pub async fn set_policy(&self, policy: Value) -> Result<Value, Error> {
        if !policy.is_object() {
            return Err(Error::Validation {
                message: "A policy object is required.",
            });
        }

        let options = RequestOptions::post(format!("{}:setIamPolicy", self.resource))
            .json(json!({ "policy": policy }));
        let success = self.executor.execute(options).await?;
        Ok(success.body.into_json().unwrap_or(Value::Null))
    }

    /// Checks which of the given permissions the caller holds on the
    /// resource. Every requested permission appears in the result; ones the
    /// response does not grant map to `false`.
    pub async fn test_permissions(
        &self,
        permissions: impl Into<Permissions>,
    ) -> Result<BTreeMap<String, bool>, Error> {
        let permissions = permissions.into();
        let options = RequestOptions::post(format!("{}:testIamPermissions", self.resource))
            .json(json!({ "permissions": permissions.names() }));
        let success = self.executor.execute(options).await?;

        let granted: Vec<String> = success
            .body
            .as_json()
            .and_then(|body| body.get("permissions"))
            .cloned()
            .map(|value| serde_json::from_value(value).unwrap_or_default())
            .unwrap_or_default();

        Ok(permission_map(&permissions, &granted))
    }
}

fn permission_map(requested: &Permissions, granted: &[String]) -> BTreeMap<String, bool> {
    requested
        .names()
        .iter()
        .map(|name| (name.clone(), granted.iter().any(|held| held == name)))
        .collect()
}
