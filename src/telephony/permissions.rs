//! Runtime permission facade.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Request code passed along with permission prompts.
pub const PERMISSION_REQUEST_CODE: i32 = 22;

/// Permissions checked before any call request.
pub const REQUIRED_PERMISSIONS: [Permission; 2] =
    [Permission::ReadPhoneState, Permission::ReadCallLog];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadPhoneState,
    ReadCallLog,
}

impl Permission {
    pub fn android_name(self) -> &'static str {
        match self {
            Permission::ReadPhoneState => "android.permission.READ_PHONE_STATE",
            Permission::ReadCallLog => "android.permission.READ_CALL_LOG",
        }
    }
}

/// Queried permission state. The prompt UI lives outside the crate.
pub trait PermissionState: Send + Sync {
    fn is_granted(&self, permission: Permission) -> bool;

    /// Fire-and-forget prompt. The outcome is observed on the next check.
    fn request(&self, permissions: &[Permission], request_code: i32);

    fn missing(&self, required: &[Permission]) -> Vec<Permission> {
        required
            .iter()
            .copied()
            .filter(|permission| !self.is_granted(*permission))
            .collect()
    }
}

/// Fixed grant set, used on desktop and in tests. Records every prompt.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    granted: Mutex<HashSet<Permission>>,
    requests: Mutex<Vec<(Vec<Permission>, i32)>>,
}

impl StaticPermissions {
    pub fn granting(permissions: &[Permission]) -> Self {
        Self {
            granted: Mutex::new(permissions.iter().copied().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn all_granted() -> Self {
        Self::granting(&REQUIRED_PERMISSIONS)
    }

    pub fn none_granted() -> Self {
        Self::default()
    }

    pub fn grant(&self, permission: Permission) {
        self.granted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(permission);
    }

    pub fn revoke(&self, permission: Permission) {
        self.granted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&permission);
    }

    pub fn requests(&self) -> Vec<(Vec<Permission>, i32)> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl PermissionState for StaticPermissions {
    fn is_granted(&self, permission: Permission) -> bool {
        self.granted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&permission)
    }

    fn request(&self, permissions: &[Permission], request_code: i32) {
        log::info!(
            "[Permissions] Requesting {:?} (request code {})",
            permissions,
            request_code
        );
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((permissions.to_vec(), request_code));
    }
}
