use bon::Builder;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{AccountType, SignatureVersion};

pub const WIDGET_BASE_URL: &str = "https://api.paymentwall.com/api";

/// Brick API hosts and paths.
#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrickEndpoints {
    #[builder(into, default = "api.paymentwall.com".to_owned())]
    pub host: String,
    #[builder(into, default = "/api/brick/token".to_owned())]
    pub one_time_token_path: String,
    #[builder(into, default = "/api/brick/charge".to_owned())]
    pub charge_path: String,
    #[builder(into, default = "/api/brick/subscription".to_owned())]
    pub subscription_path: String,
    /// Gateway used for one-time tokens when the secret is not a project key.
    #[builder(into, default = "pwgateway.com".to_owned())]
    pub test_host: String,
    #[builder(into, default = "/api/token".to_owned())]
    pub test_one_time_token_path: String,
}

impl Default for BrickEndpoints {
    fn default() -> Self {
        BrickEndpoints::builder().build()
    }
}

/// Merchant credentials and platform endpoints, shared by every component.
#[derive(Builder, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub account_type: AccountType,
    /// Project (public) key.
    #[builder(into)]
    pub app_key: String,
    /// Secret key used for signing and for the `X-ApiKey` header.
    #[builder(into)]
    pub secret_key: String,
    /// Widget signature version when the account type does not force one.
    #[builder(default)]
    #[serde(default)]
    pub default_signature_version: SignatureVersion,
    #[builder(default = default_widget_base_url())]
    #[serde(default = "default_widget_base_url")]
    pub widget_base_url: Url,
    #[builder(default)]
    #[serde(default)]
    pub brick: BrickEndpoints,
}

impl Config {
    /// Project secrets carry an underscore; anything else is routed to the
    /// test gateway for one-time tokens.
    pub fn has_project_secret(&self) -> bool {
        self.secret_key.contains('_')
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("account_type", &self.account_type)
            .field("app_key", &self.app_key)
            .field("secret_key", &"<redacted>")
            .field("default_signature_version", &self.default_signature_version)
            .field("widget_base_url", &self.widget_base_url.as_str())
            .field("brick", &self.brick)
            .finish()
    }
}

fn default_widget_base_url() -> Url {
    Url::parse(WIDGET_BASE_URL).expect("WIDGET_BASE_URL is a valid URL")
}
