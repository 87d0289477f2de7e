//! Credential profile and account selection
//!
//! Each operator machine maps to four named profiles, one per
//! (dev/prod, China/global) partition.

use std::collections::HashMap;

use alertscope_types::is_china_region;
use serde::{Deserialize, Serialize};

use crate::error::ProfileError;

/// Named profiles of one operator machine
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSet {
    pub dev_cn: String,
    pub dev_us: String,
    pub prod_cn: String,
    pub prod_us: String,
}

impl ProfileSet {
    /// Profile for a region in dev or prod accounts
    pub fn select(&self, region: &str, prod: bool) -> &str {
        match (prod, is_china_region(region)) {
            (false, true) => &self.dev_cn,
            (false, false) => &self.dev_us,
            (true, true) => &self.prod_cn,
            (true, false) => &self.prod_us,
        }
    }

    /// Profiles configured for `host`
    pub fn for_host<'a>(
        profiles: &'a HashMap<String, ProfileSet>,
        host: &str,
    ) -> Result<&'a ProfileSet, ProfileError> {
        profiles
            .get(host)
            .ok_or_else(|| ProfileError::UnknownHost(host.to_string()))
    }
}

/// AWS account ids per partition
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountIds {
    pub dev_cn: String,
    pub dev_us: String,
    pub prod_cn: String,
    pub prod_us: String,
}

impl AccountIds {
    pub fn select(&self, region: &str, prod: bool) -> &str {
        match (prod, is_china_region(region)) {
            (false, true) => &self.dev_cn,
            (false, false) => &self.dev_us,
            (true, true) => &self.prod_cn,
            (true, false) => &self.prod_us,
        }
    }
}

/// Shell command that refreshes an expired MFA session
pub fn expired_token_remediation(region: &str, profile: &str) -> String {
    format!(
        "export AWS_DEFAULT_REGION={};aws-mfa --duration 43200 --profile {}",
        region, profile
    )
}

/// Name of this machine
pub fn current_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
