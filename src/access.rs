use crate::models::Upload;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    NotOwner,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// Who may download which upload.
#[derive(Clone, Copy, Debug)]
pub struct AccessPolicy {
    pub allow_global_downloads: bool,
}

impl AccessPolicy {
    pub fn new(allow_global_downloads: bool) -> Self {
        Self { allow_global_downloads }
    }

    pub fn authorize_download(&self, requester: Option<i64>, upload: &Upload) -> Decision {
        let Some(user_id) = requester else {
            return Decision::Deny(DenyReason::NotAuthenticated);
        };
        if self.allow_global_downloads || user_id == upload.user_id {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::NotOwner)
        }
    }
}
