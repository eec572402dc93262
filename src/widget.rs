//! Signed widget URLs.

use bon::Builder;
use url::Url;

use crate::{
    config::Config,
    errors::{Error, Result},
    product::Product,
    signature::{self, SIGN_VERSION_KEY, SignedFields, WIDGET_SIGNATURE_KEY},
    types::{AccountType, Parameters, SignatureVersion},
};

pub const VC_CONTROLLER: &str = "ps";
pub const GOODS_CONTROLLER: &str = "subscription";
pub const CART_CONTROLLER: &str = "cart";

/// Widget code prefixes served without the per-account controller.
const CONTROLLER_BYPASS_PREFIXES: [&str; 3] = ["w", "s", "mw"];

/// A payment widget request for one user.
///
/// # Example
///
/// ```rust
/// use paymentwall_kit::{
///     config::Config,
///     product::Product,
///     types::{AccountType, Price},
///     widget::Widget,
/// };
///
/// let config = Config::builder()
///     .account_type(AccountType::DigitalGoods)
///     .app_key("app-key")
///     .secret_key("secret-key")
///     .build();
///
/// let url = Widget::builder()
///     .config(&config)
///     .user_id("user-1")
///     .widget_code("p1_1")
///     .products(vec![
///         Product::builder()
///             .id("product301")
///             .amount(Price::from_cents(999))
///             .currency_code("USD")
///             .build(),
///     ])
///     .build()
///     .url()
///     .unwrap();
///
/// assert!(url.as_str().starts_with("https://api.paymentwall.com/api/subscription?"));
/// ```
#[derive(Builder, Debug, Clone)]
pub struct Widget<'c> {
    config: &'c Config,
    #[builder(into)]
    user_id: String,
    #[builder(into)]
    widget_code: String,
    #[builder(default)]
    products: Vec<Product>,
    /// Merged over the computed parameters before signing.
    #[builder(default)]
    extra_params: Parameters,
}

impl Widget<'_> {
    /// The version used for this widget.
    ///
    /// An explicit `sign_version` extra parameter always wins; otherwise Cart
    /// accounts use V2 and every other account type the configured default.
    pub fn signature_version(&self) -> Result<SignatureVersion> {
        match self.extra_params.get(SIGN_VERSION_KEY) {
            Some(code) if !code.is_empty() => code.parse(),
            _ => Ok(self.default_signature_version()),
        }
    }

    fn default_signature_version(&self) -> SignatureVersion {
        match self.config.account_type {
            AccountType::Cart => SignatureVersion::V2,
            _ => self.config.default_signature_version,
        }
    }

    /// Every query parameter of the widget, `sign` included.
    pub fn params(&self) -> Result<Parameters> {
        let version = self.signature_version()?;
        let mut params = self.unsigned_params(version);

        let sign = signature::sign(
            &params,
            &self.config.secret_key,
            version,
            &SignedFields::WIDGET,
        );
        params.insert(WIDGET_SIGNATURE_KEY, sign);

        Ok(params)
    }

    fn unsigned_params(&self, version: SignatureVersion) -> Parameters {
        let mut params = Parameters::from([
            ("key", self.config.app_key.as_str()),
            ("uid", self.user_id.as_str()),
            ("widget", self.widget_code.as_str()),
        ]);

        match self.config.account_type {
            AccountType::DigitalGoods => {
                if self.products.len() > 1 {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "Digital goods widgets carry a single product; ignoring {} extra product(s)",
                        self.products.len() - 1
                    );
                }
                if let Some(product) = self.products.first() {
                    insert_goods_params(&mut params, product);
                }
            }
            AccountType::Cart => insert_cart_params(&mut params, &self.products),
            AccountType::VirtualCurrency => {}
        }

        params.insert(SIGN_VERSION_KEY, version.to_string());

        let mut extra = self.extra_params.without(SIGN_VERSION_KEY);
        extra.remove(WIDGET_SIGNATURE_KEY);
        params.merge(&extra);

        params
    }

    /// Path segment of the widget endpoint.
    ///
    /// In a flexible call, Digital Goods widgets are served without a
    /// controller.
    pub fn controller(&self, flexible: bool) -> &'static str {
        let bypass = CONTROLLER_BYPASS_PREFIXES
            .iter()
            .any(|prefix| self.widget_code.starts_with(prefix));

        match self.config.account_type {
            AccountType::VirtualCurrency if !bypass => VC_CONTROLLER,
            AccountType::DigitalGoods if !flexible && !bypass => GOODS_CONTROLLER,
            AccountType::Cart => CART_CONTROLLER,
            _ => "",
        }
    }

    /// `<base>/<controller>?<params>` with `sign` as the last query pair.
    pub fn url(&self) -> Result<Url> {
        let controller = self.controller(false);
        let mut params = self.params()?;
        let sign = params.remove(WIDGET_SIGNATURE_KEY).unwrap_or_default();

        let mut url = self.config.widget_base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidBaseUrl(self.config.widget_base_url.to_string()))?
            .pop_if_empty()
            .push(controller);
        url.query_pairs_mut()
            .extend_pairs(params.iter())
            .append_pair(WIDGET_SIGNATURE_KEY, &sign);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Built widget URL: widget='{}', controller='{}', sign_version={}",
            self.widget_code,
            controller,
            params.get(SIGN_VERSION_KEY).unwrap_or_default()
        );

        Ok(url)
    }
}

/// Flattens a Digital Goods product into `ag_*` parameters.
///
/// With a trial, the trial terms take the primary slots and the outer product
/// is billed afterwards under `ag_post_trial_*`.
fn insert_goods_params(params: &mut Parameters, product: &Product) {
    let (product, post_trial) = match product.trial_product() {
        Some(trial) => (trial, Some(product)),
        None => (product, None),
    };

    params.insert("amount", product.amount().to_string());
    params.insert("currencyCode", product.currency_code().unwrap_or_default());
    params.insert("ag_name", product.name().unwrap_or_default());
    params.insert("ag_external_id", product.id());
    params.insert("ag_type", product.product_type().as_str());

    if !product.is_subscription() {
        return;
    }

    params.insert("ag_period_length", product.period_length().to_string());
    params.insert(
        "ag_period_type",
        product.period_type().map(|p| p.as_str()).unwrap_or_default(),
    );

    if !product.is_recurring() {
        return;
    }

    params.insert("ag_recurring", "1");

    if let Some(post_trial) = post_trial {
        params.insert("ag_trial", "1");
        params.insert("ag_post_trial_external_id", post_trial.id());
        params.insert(
            "ag_post_trial_period_length",
            post_trial.period_length().to_string(),
        );
        params.insert(
            "ag_post_trial_period_type",
            post_trial.period_type().map(|p| p.as_str()).unwrap_or_default(),
        );
        params.insert("ag_post_trial_name", post_trial.name().unwrap_or_default());
        params.insert("post_trial_amount", post_trial.amount().to_string());
        params.insert(
            "post_trial_currencyCode",
            post_trial.currency_code().unwrap_or_default(),
        );
    }
}

/// Indexed `external_ids[i]`, `prices[i]` and `currencies[i]`, in product order.
fn insert_cart_params(params: &mut Parameters, products: &[Product]) {
    for (index, product) in products.iter().enumerate() {
        params.insert(format!("external_ids[{index}]"), product.id());
        if !product.amount().is_zero() {
            params.insert(format!("prices[{index}]"), product.amount().to_string());
        }
        if let Some(currency) = product.currency_code() {
            params.insert(format!("currencies[{index}]"), currency);
        }
    }
}
