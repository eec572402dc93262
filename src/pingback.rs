//! Validation of inbound pingbacks.
//!
//! [`Pingback::validate`] runs three gates in order and stops at the first one
//! that fails:
//!
//! 1. every required parameter is present and non-empty,
//! 2. the request comes from a trusted origin (can be skipped),
//! 3. the `sig` parameter matches the recomputed signature.
//!
//! Failures are recorded in an [`ErrorLog`] rather than returned as errors.
//! Deduplication is left to the caller, keyed by [`Pingback::unique_id`].

use std::net::Ipv4Addr;

use crate::{
    config::Config,
    errors::{Error, Result},
    product::{PeriodType, Product, ProductType},
    signature::{self, PINGBACK_SIGNATURE_KEY, SIGN_VERSION_KEY, SignedFields},
    types::{AccountType, AnyJson, Parameters, SignatureVersion},
};

/// Addresses the platform sends pingbacks from.
pub const PINGBACK_IP_WHITELIST: [&str; 5] = [
    "174.36.92.186",
    "174.36.96.66",
    "174.36.92.187",
    "174.36.92.192",
    "174.37.14.28",
];

/// The only required field the platform sends as an indexed family.
const INDEXED_REQUIRED_FIELD: &str = "goodsid";

/// `/24` networks the platform sends pingbacks from.
pub const PINGBACK_SUBNETS: [[u8; 3]; 1] = [[216, 127, 71]];

/// Which source addresses are accepted by the origin gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPolicy {
    pub addresses: Vec<String>,
    pub subnets: Vec<[u8; 3]>,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        OriginPolicy {
            addresses: PINGBACK_IP_WHITELIST.iter().map(|ip| ip.to_string()).collect(),
            subnets: PINGBACK_SUBNETS.to_vec(),
        }
    }
}

impl OriginPolicy {
    pub fn is_trusted(&self, ip_address: &str) -> bool {
        if self.addresses.iter().any(|allowed| allowed == ip_address) {
            return true;
        }

        match ip_address.parse::<Ipv4Addr>() {
            Ok(ip) => {
                let [a, b, c, _] = ip.octets();
                self.subnets.contains(&[a, b, c])
            }
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PingbackType {
    /// Payment delivered.
    Regular,
    /// Credit granted by customer support.
    Goodwill,
    /// Chargeback, refund or cancellation.
    Negative,
}

impl PingbackType {
    pub fn code(&self) -> u8 {
        match self {
            PingbackType::Regular => 0,
            PingbackType::Goodwill => 1,
            PingbackType::Negative => 2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().parse::<i64>().ok()? {
            0 => Some(PingbackType::Regular),
            1 => Some(PingbackType::Goodwill),
            2 => Some(PingbackType::Negative),
            _ => None,
        }
    }
}

/// What the merchant should do with a validated pingback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Grant the purchase.
    Deliver,
    /// Revoke the purchase.
    Cancel,
    /// Unknown type; must not be acknowledged as processed.
    Unhandled,
}

/// A single failed check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Parameter {0} is missing")]
    MissingParameter(String),
    #[error("IP address is not whitelisted")]
    UntrustedOrigin,
    #[error("Unsupported signature version: {0}")]
    UnsupportedSignatureVersion(String),
    #[error("Wrong signature")]
    SignatureMismatch,
}

/// Ordered failures of one validation attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorLog(Vec<ValidationError>);

impl ErrorLog {
    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    pub fn entries(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    /// Newline-separated messages.
    pub fn summary(&self) -> String {
        self.messages().join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// An inbound pingback, bound to the merchant configuration it is checked against.
///
/// # Example
///
/// ```rust
/// use paymentwall_kit::{config::Config, pingback::Pingback, types::AccountType};
///
/// let config = Config::builder()
///     .account_type(AccountType::VirtualCurrency)
///     .app_key("app-key")
///     .secret_key("mySecret")
///     .build();
///
/// let mut pingback = Pingback::from_query(
///     &config,
///     "uid=1&currency=USD&type=0&ref=abc&sig=e3b0c44298fc1c149afbf4c8996fb924",
///     "174.36.92.186",
///     false,
/// );
///
/// assert!(!pingback.validate(false));
/// assert_eq!(pingback.error_summary(), "Wrong signature");
/// ```
#[derive(Debug, Clone)]
pub struct Pingback<'c> {
    config: &'c Config,
    parameters: Parameters,
    ip_address: String,
    brick: bool,
    origin_policy: OriginPolicy,
    errors: ErrorLog,
}

impl<'c> Pingback<'c> {
    pub fn new(
        config: &'c Config,
        parameters: Parameters,
        ip_address: impl Into<String>,
        brick: bool,
    ) -> Self {
        Pingback {
            config,
            parameters,
            ip_address: ip_address.into(),
            brick,
            origin_policy: OriginPolicy::default(),
            errors: ErrorLog::default(),
        }
    }

    /// Builds a pingback from a raw query string.
    pub fn from_query(
        config: &'c Config,
        query: &str,
        ip_address: impl Into<String>,
        brick: bool,
    ) -> Self {
        Pingback::new(config, Parameters::from_query(query), ip_address, brick)
    }

    /// Builds a pingback from already-decoded JSON parameters.
    ///
    /// Fails with [`crate::errors::Error::MalformedParameters`] when `value` is
    /// not a flat object.
    pub fn from_json(
        config: &'c Config,
        value: &AnyJson,
        ip_address: impl Into<String>,
        brick: bool,
    ) -> Result<Self> {
        Ok(Pingback::new(
            config,
            Parameters::try_from_json(value)?,
            ip_address,
            brick,
        ))
    }

    pub fn with_origin_policy(mut self, origin_policy: OriginPolicy) -> Self {
        self.origin_policy = origin_policy;
        self
    }

    /// Runs all gates. The error log is reset first.
    pub fn validate(&mut self, skip_ip_whitelist_check: bool) -> bool {
        self.errors.clear();

        if !self.is_parameters_valid() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Pingback rejected: missing parameters: {}",
                self.errors.summary()
            );
            return false;
        }

        if !skip_ip_whitelist_check && !self.is_ip_address_valid() {
            self.errors.push(ValidationError::UntrustedOrigin);
            #[cfg(feature = "tracing")]
            tracing::debug!("Pingback rejected: untrusted origin {}", self.ip_address);
            return false;
        }

        if !self.is_signature_valid() {
            self.errors.push(ValidationError::SignatureMismatch);
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Pingback rejected: wrong signature for ref='{}'",
                self.reference_id().unwrap_or_default()
            );
            return false;
        }

        true
    }

    /// Parameters that must be present for this account type.
    pub fn required_parameters(&self) -> &'static [&'static str] {
        match (self.config.account_type, self.brick) {
            (AccountType::VirtualCurrency, _) => &["uid", "currency", "type", "ref", "sig"],
            (AccountType::DigitalGoods, true) => &["uid", "type", "ref", "sig"],
            (AccountType::DigitalGoods, false) | (AccountType::Cart, _) => {
                &["uid", "goodsid", "type", "ref", "sig"]
            }
        }
    }

    /// Logs one [`ValidationError::MissingParameter`] per absent or empty field.
    pub fn is_parameters_valid(&mut self) -> bool {
        let mut valid = true;
        for field in self.required_parameters() {
            let present = if *field == INDEXED_REQUIRED_FIELD {
                self.parameters.has_indexed_value(field)
            } else {
                self.parameters.has_value(field)
            };
            if !present {
                self.errors
                    .push(ValidationError::MissingParameter(field.to_string()));
                valid = false;
            }
        }
        valid
    }

    pub fn is_ip_address_valid(&self) -> bool {
        self.origin_policy.is_trusted(&self.ip_address)
    }

    /// The version the platform used to sign this pingback.
    ///
    /// Cart pingbacks are always V2. Otherwise an absent or empty
    /// `sign_version` means V1. An unknown code fails with
    /// [`Error::InvalidSignatureVersion`].
    pub fn signature_version(&self) -> Result<SignatureVersion> {
        if self.config.account_type == AccountType::Cart {
            return Ok(SignatureVersion::V2);
        }

        match self.parameters.get(SIGN_VERSION_KEY) {
            None | Some("") => Ok(SignatureVersion::V1),
            Some(code) => code.parse(),
        }
    }

    /// Recomputes the signature and compares it with `sig`.
    ///
    /// An unknown signature version is logged and fails the check.
    pub fn is_signature_valid(&mut self) -> bool {
        let version = match self.signature_version() {
            Ok(version) => version,
            Err(Error::InvalidSignatureVersion(code)) => {
                self.errors
                    .push(ValidationError::UnsupportedSignatureVersion(code));
                return false;
            }
            Err(other) => {
                self.errors
                    .push(ValidationError::UnsupportedSignatureVersion(other.to_string()));
                return false;
            }
        };

        let mut signed = self.parameters.without(PINGBACK_SIGNATURE_KEY);
        if self.config.account_type == AccountType::Cart {
            signed.insert(SIGN_VERSION_KEY, version.to_string());
        }

        let claimed = self
            .parameters
            .get(PINGBACK_SIGNATURE_KEY)
            .unwrap_or_default();

        signature::verify(
            &signed,
            &self.config.secret_key,
            version,
            &SignedFields::pingback(self.config.account_type, self.brick),
            claimed,
        )
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn error_summary(&self) -> String {
        self.errors.summary()
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name)
    }

    pub fn ip_address(&self) -> &str {
        &self.ip_address
    }

    pub fn is_brick(&self) -> bool {
        self.brick
    }

    pub fn user_id(&self) -> Option<&str> {
        self.parameter("uid")
    }

    pub fn virtual_currency_amount(&self) -> Option<&str> {
        self.parameter("currency")
    }

    pub fn product_id(&self) -> Option<&str> {
        self.parameter("goodsid")
    }

    pub fn product_period_length(&self) -> Option<&str> {
        self.parameter("slength")
    }

    pub fn product_period_type(&self) -> Option<&str> {
        self.parameter("speriod")
    }

    pub fn reference_id(&self) -> Option<&str> {
        self.parameter("ref")
    }

    /// `None` for a missing, non-numeric or unknown `type`.
    pub fn pingback_type(&self) -> Option<PingbackType> {
        self.parameter("type").and_then(PingbackType::parse)
    }

    /// `<ref>_<type>`, stable across redeliveries of the same event.
    ///
    /// An unrecognized type is rendered as received.
    pub fn unique_id(&self) -> String {
        let kind = match self.pingback_type() {
            Some(kind) => kind.code().to_string(),
            None => self.parameter("type").unwrap_or_default().to_string(),
        };
        format!("{}_{}", self.reference_id().unwrap_or_default(), kind)
    }

    /// The purchased product as far as the pingback describes it.
    pub fn product(&self) -> Product {
        let period_length = self
            .product_period_length()
            .and_then(|length| length.trim().parse::<u32>().ok())
            .unwrap_or(0);
        let product_type = if period_length > 0 {
            ProductType::Subscription
        } else {
            ProductType::Fixed
        };

        Product::builder()
            .id(self.product_id().unwrap_or_default())
            .product_type(product_type)
            .period_length(period_length)
            .maybe_period_type(self.product_period_type().and_then(PeriodType::parse))
            .build()
    }

    /// One product per `goodsid[i]` entry, for Cart pingbacks.
    pub fn products(&self) -> Vec<Product> {
        self.parameters
            .indexed_values("goodsid")
            .into_iter()
            .map(|id| Product::builder().id(id).build())
            .collect()
    }

    pub fn is_deliverable(&self) -> bool {
        matches!(
            self.pingback_type(),
            Some(PingbackType::Regular | PingbackType::Goodwill)
        )
    }

    pub fn is_cancelable(&self) -> bool {
        self.pingback_type() == Some(PingbackType::Negative)
    }

    pub fn disposition(&self) -> Disposition {
        match self.pingback_type() {
            Some(PingbackType::Regular | PingbackType::Goodwill) => Disposition::Deliver,
            Some(PingbackType::Negative) => Disposition::Cancel,
            None => Disposition::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUSTED_IP: &str = "174.36.92.186";

    fn config(account_type: AccountType) -> Config {
        Config::builder()
            .account_type(account_type)
            .app_key("app")
            .secret_key("mySecret")
            .build()
    }

    fn signed_vc_params() -> Parameters {
        let params =
            Parameters::from([("uid", "1"), ("currency", "USD"), ("type", "0"), ("ref", "abc")]);
        let sig = format!("{:x}", md5::compute(b"1USD0abcmySecret"));
        params.with("sig", sig)
    }

    #[test]
    fn test_origin_policy() {
        let policy = OriginPolicy::default();
        for ip in PINGBACK_IP_WHITELIST {
            assert!(policy.is_trusted(ip));
        }
        assert!(policy.is_trusted("216.127.71.0"));
        assert!(policy.is_trusted("216.127.71.255"));
        assert!(!policy.is_trusted("216.127.72.1"));
        assert!(!policy.is_trusted("216.127.71.256"));
        assert!(!policy.is_trusted("216.127.71"));
        assert!(!policy.is_trusted("127.0.0.1"));
        assert!(!policy.is_trusted(""));
    }

    #[test]
    fn test_valid_vc_pingback() {
        let config = config(AccountType::VirtualCurrency);
        let mut pingback = Pingback::new(&config, signed_vc_params(), TRUSTED_IP, false);
        assert!(pingback.validate(false));
        assert!(pingback.errors().is_empty());
        assert_eq!(pingback.error_summary(), "");
    }

    #[test]
    fn test_missing_parameters_stop_validation() {
        let config = config(AccountType::VirtualCurrency);
        let mut params = signed_vc_params();
        params.remove("currency");
        params.insert("ref", "");

        let mut pingback = Pingback::new(&config, params, "10.0.0.1", false);
        assert!(!pingback.validate(false));
        assert_eq!(
            pingback.errors().entries(),
            &[
                ValidationError::MissingParameter("currency".to_string()),
                ValidationError::MissingParameter("ref".to_string()),
            ]
        );
        assert_eq!(
            pingback.error_summary(),
            "Parameter currency is missing\nParameter ref is missing"
        );
    }

    #[test]
    fn test_untrusted_origin() {
        let config = config(AccountType::VirtualCurrency);
        let mut pingback = Pingback::new(&config, signed_vc_params(), "10.0.0.1", false);
        assert!(!pingback.validate(false));
        assert_eq!(pingback.errors().entries(), &[ValidationError::UntrustedOrigin]);

        assert!(pingback.validate(true));
        assert!(pingback.errors().is_empty());
    }

    #[test]
    fn test_custom_origin_policy() {
        let config = config(AccountType::VirtualCurrency);
        let mut pingback = Pingback::new(&config, signed_vc_params(), "10.0.0.1", false)
            .with_origin_policy(OriginPolicy {
                addresses: vec!["10.0.0.1".to_string()],
                subnets: vec![],
            });
        assert!(pingback.validate(false));
    }

    #[test]
    fn test_wrong_signature() {
        let config = config(AccountType::VirtualCurrency);
        let params = signed_vc_params().with("currency", "EUR");
        let mut pingback = Pingback::new(&config, params, TRUSTED_IP, false);
        assert!(!pingback.validate(false));
        assert_eq!(pingback.error_summary(), "Wrong signature");
    }

    #[test]
    fn test_unsupported_signature_version() {
        let config = config(AccountType::VirtualCurrency);
        let params = signed_vc_params().with("sign_version", "9");
        let mut pingback = Pingback::new(&config, params, TRUSTED_IP, false);
        assert!(!pingback.validate(false));
        assert_eq!(
            pingback.errors().entries(),
            &[
                ValidationError::UnsupportedSignatureVersion("9".to_string()),
                ValidationError::SignatureMismatch,
            ]
        );
    }

    #[test]
    fn test_required_parameters_by_account() {
        let vc = config(AccountType::VirtualCurrency);
        let goods = config(AccountType::DigitalGoods);
        let cart = config(AccountType::Cart);
        let empty = Parameters::new;

        assert_eq!(
            Pingback::new(&vc, empty(), TRUSTED_IP, false).required_parameters(),
            &["uid", "currency", "type", "ref", "sig"]
        );
        assert_eq!(
            Pingback::new(&goods, empty(), TRUSTED_IP, true).required_parameters(),
            &["uid", "type", "ref", "sig"]
        );
        assert_eq!(
            Pingback::new(&goods, empty(), TRUSTED_IP, false).required_parameters(),
            &["uid", "goodsid", "type", "ref", "sig"]
        );
        assert_eq!(
            Pingback::new(&cart, empty(), TRUSTED_IP, false).required_parameters(),
            &["uid", "goodsid", "type", "ref", "sig"]
        );
    }

    #[test]
    fn test_type_dispositions() {
        let config = config(AccountType::VirtualCurrency);
        let with_type = |t: &str| {
            Pingback::new(&config, Parameters::from([("type", t), ("ref", "tx")]), TRUSTED_IP, false)
        };

        assert_eq!(with_type("0").disposition(), Disposition::Deliver);
        assert!(with_type("1").is_deliverable());
        assert!(with_type("2").is_cancelable());
        assert!(!with_type("2").is_deliverable());

        for unknown in ["3", "abc", ""] {
            let pingback = with_type(unknown);
            assert_eq!(pingback.pingback_type(), None);
            assert!(!pingback.is_deliverable());
            assert!(!pingback.is_cancelable());
            assert_eq!(pingback.disposition(), Disposition::Unhandled);
        }
    }

    #[test]
    fn test_unique_id() {
        let config = config(AccountType::VirtualCurrency);
        let pingback = Pingback::new(
            &config,
            Parameters::from([("ref", "tx123"), ("type", "1")]),
            TRUSTED_IP,
            false,
        );
        assert_eq!(pingback.unique_id(), "tx123_1");

        let unknown = Pingback::new(
            &config,
            Parameters::from([("ref", "tx123"), ("type", "7")]),
            TRUSTED_IP,
            false,
        );
        assert_eq!(unknown.unique_id(), "tx123_7");
    }

    #[test]
    fn test_product_from_pingback() {
        let config = config(AccountType::DigitalGoods);
        let subscription = Pingback::new(
            &config,
            Parameters::from([("goodsid", "gold"), ("slength", "3"), ("speriod", "month")]),
            TRUSTED_IP,
            false,
        )
        .product();
        assert_eq!(subscription.id(), "gold");
        assert_eq!(subscription.product_type(), ProductType::Subscription);
        assert_eq!(subscription.period_length(), 3);
        assert_eq!(subscription.period_type(), Some(PeriodType::Month));
        assert_eq!(subscription.amount().to_string(), "0.00");

        let fixed = Pingback::new(
            &config,
            Parameters::from([("goodsid", "gem"), ("slength", "0")]),
            TRUSTED_IP,
            false,
        )
        .product();
        assert_eq!(fixed.product_type(), ProductType::Fixed);
        assert_eq!(fixed.period_type(), None);
    }

    #[test]
    fn test_cart_products() {
        let config = config(AccountType::Cart);
        let pingback = Pingback::from_query(
            &config,
            "uid=1&goodsid=a&goodsid=b&type=0&ref=r",
            TRUSTED_IP,
            false,
        );
        let ids: Vec<String> = pingback
            .products()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        let mut pingback = pingback;
        assert!(!pingback.validate(true));
        assert_eq!(
            pingback.errors().entries(),
            &[ValidationError::MissingParameter("sig".to_string())]
        );
    }

    #[test]
    fn test_indexed_required_field_is_not_a_substitute() {
        let config = config(AccountType::VirtualCurrency);
        let mut pingback = Pingback::from_query(
            &config,
            "uid[]=1&currency=USD&type=0&ref=abc&sig=x",
            TRUSTED_IP,
            false,
        );
        assert!(!pingback.validate(false));
        assert_eq!(
            pingback.errors().entries(),
            &[ValidationError::MissingParameter("uid".to_string())]
        );
    }

    #[test]
    fn test_signature_version_of_pingback() {
        let config = config(AccountType::VirtualCurrency);
        let pingback = |version: &str| {
            Pingback::new(
                &config,
                Parameters::from([("sign_version", version)]),
                TRUSTED_IP,
                false,
            )
        };
        assert_eq!(pingback("").signature_version().unwrap(), SignatureVersion::V1);
        assert_eq!(pingback("2").signature_version().unwrap(), SignatureVersion::V2);
        assert!(matches!(
            pingback("9").signature_version(),
            Err(Error::InvalidSignatureVersion(code)) if code == "9"
        ));
    }
}
