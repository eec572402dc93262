//! Brick API requests: one-time tokens, charges and subscriptions.
//!
//! Every call is a form-encoded `POST` authenticated with the secret key in
//! the `X-ApiKey` header. Building a [`BrickRequest`] performs no I/O; a
//! [`Transport`] delivers it.

use bon::Builder;
use http::{HeaderMap, HeaderValue, Method, header::CONTENT_TYPE};
use url::Url;

use crate::{
    concepts::{BrickResponse, Transport},
    config::Config,
    errors::{Error, Result},
    product::PeriodType,
    types::{Parameters, Price},
};

pub const X_API_KEY: &str = "x-apikey";
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A prepared Brick API call.
#[derive(Debug, Clone)]
pub struct BrickRequest {
    pub host: String,
    pub path: String,
    pub method: Method,
    pub headers: HeaderMap,
    /// Form-encoded body, possibly empty.
    pub body: String,
}

impl BrickRequest {
    pub fn post(
        config: &Config,
        host: impl Into<String>,
        path: impl Into<String>,
        body: &Parameters,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_CONTENT_TYPE));
        let mut api_key = HeaderValue::from_str(&config.secret_key)?;
        api_key.set_sensitive(true);
        headers.insert(X_API_KEY, api_key);

        Ok(BrickRequest {
            host: host.into(),
            path: path.into(),
            method: Method::POST,
            headers,
            body: body.to_query(),
        })
    }

    /// `https://<host><path>`. `?` and `#` in the path stay part of the path.
    pub fn url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("https://{}", self.host))?;
        url.set_path(&self.path);
        Ok(url)
    }
}

/// `<base_path>/<id>[/<action>]` with `id` percent-encoded as one segment.
fn operation_path(
    config: &Config,
    base_path: &str,
    id: &str,
    action: Option<&str>,
) -> Result<String> {
    let base = format!("https://{}{}", config.brick.host, base_path);
    let mut url = Url::parse(&base)?;
    url.path_segments_mut()
        .map_err(|_| Error::InvalidBaseUrl(base.clone()))?
        .pop_if_empty()
        .push(id)
        .extend(action);
    Ok(url.path().to_string())
}

/// Errors of a Brick call made through a [`Transport`].
#[derive(Debug, thiserror::Error)]
pub enum BrickError<E: std::error::Error + 'static> {
    #[error("Failed to build request: {0}")]
    Request(#[from] Error),
    #[error("Transport error: {0}")]
    Transport(#[source] E),
}

async fn dispatch<T: Transport>(
    transport: &T,
    request: BrickRequest,
) -> std::result::Result<Vec<BrickResponse>, BrickError<T::Error>>
where
    T::Error: 'static,
{
    #[cfg(feature = "tracing")]
    tracing::debug!("Sending Brick request: {} {}{}", request.method, request.host, request.path);

    transport.send(request).await.map_err(BrickError::Transport)
}

fn optional(value: Option<&str>) -> &str {
    value.unwrap_or_default()
}

/// Card details exchanged for a one-time token.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct Card {
    #[builder(into)]
    pub number: String,
    #[builder(into)]
    pub exp_month: String,
    #[builder(into)]
    pub exp_year: String,
    #[builder(into)]
    pub cvv: String,
}

/// Tokenizes a card for a later charge or subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneTimeToken {
    pub card: Card,
}

impl OneTimeToken {
    pub fn new(card: Card) -> Self {
        OneTimeToken { card }
    }

    pub fn params(&self, config: &Config) -> Parameters {
        Parameters::from([
            ("public_key", config.app_key.as_str()),
            ("card[number]", self.card.number.as_str()),
            ("card[exp_month]", self.card.exp_month.as_str()),
            ("card[exp_year]", self.card.exp_year.as_str()),
            ("card[cvv]", self.card.cvv.as_str()),
        ])
    }

    /// Non-project secrets are sent to the test gateway.
    pub fn create_request(&self, config: &Config) -> Result<BrickRequest> {
        let (host, path) = if config.has_project_secret() {
            (&config.brick.host, &config.brick.one_time_token_path)
        } else {
            (&config.brick.test_host, &config.brick.test_one_time_token_path)
        };
        BrickRequest::post(config, host, path, &self.params(config))
    }

    pub async fn create<T: Transport>(
        &self,
        config: &Config,
        transport: &T,
    ) -> std::result::Result<Vec<BrickResponse>, BrickError<T::Error>>
    where
        T::Error: 'static,
    {
        dispatch(transport, self.create_request(config)?).await
    }
}

/// A one-time payment.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    pub amount: Option<Price>,
    #[builder(into, default = "USD".to_owned())]
    pub currency: String,
    #[builder(into)]
    pub description: Option<String>,
    #[builder(into)]
    pub email: Option<String>,
    #[builder(into)]
    pub fingerprint: Option<String>,
    /// One-time token from [`OneTimeToken`].
    #[builder(into)]
    pub token: Option<String>,
    /// Merged over the standard fields.
    #[builder(default)]
    pub extra: Parameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOperation {
    Detail,
    Refund,
    Capture,
    Void,
}

impl ChargeOperation {
    /// Path segment after the charge id, if any.
    pub fn action(&self) -> Option<&'static str> {
        match self {
            ChargeOperation::Detail => None,
            ChargeOperation::Refund => Some("refund"),
            ChargeOperation::Capture => Some("capture"),
            ChargeOperation::Void => Some("void"),
        }
    }
}

impl Charge {
    pub fn params(&self, config: &Config) -> Parameters {
        let amount = self.amount.map(|a| a.to_string()).unwrap_or_default();
        let mut params = Parameters::from([
            ("public_key", config.app_key.as_str()),
            ("amount", amount.as_str()),
            ("currency", self.currency.as_str()),
            ("description", optional(self.description.as_deref())),
            ("email", optional(self.email.as_deref())),
            ("fingerprint", optional(self.fingerprint.as_deref())),
            ("token", optional(self.token.as_deref())),
        ]);
        params.merge(&self.extra);
        params
    }

    pub fn create_request(&self, config: &Config) -> Result<BrickRequest> {
        BrickRequest::post(
            config,
            &config.brick.host,
            &config.brick.charge_path,
            &self.params(config),
        )
    }

    /// Detail, refund, capture or void an existing charge. The body is empty.
    pub fn operation_request(
        config: &Config,
        charge_id: &str,
        operation: ChargeOperation,
    ) -> Result<BrickRequest> {
        BrickRequest::post(
            config,
            &config.brick.host,
            operation_path(
                config,
                &config.brick.charge_path,
                charge_id,
                operation.action(),
            )?,
            &Parameters::new(),
        )
    }

    pub async fn create<T: Transport>(
        &self,
        config: &Config,
        transport: &T,
    ) -> std::result::Result<Vec<BrickResponse>, BrickError<T::Error>>
    where
        T::Error: 'static,
    {
        dispatch(transport, self.create_request(config)?).await
    }

    pub async fn operation<T: Transport>(
        config: &Config,
        transport: &T,
        charge_id: &str,
        operation: ChargeOperation,
    ) -> std::result::Result<Vec<BrickResponse>, BrickError<T::Error>>
    where
        T::Error: 'static,
    {
        dispatch(
            transport,
            Charge::operation_request(config, charge_id, operation)?,
        )
        .await
    }
}

/// A recurring payment.
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub amount: Option<Price>,
    #[builder(into, default = "USD".to_owned())]
    pub currency: String,
    #[builder(into)]
    pub description: Option<String>,
    #[builder(into)]
    pub email: Option<String>,
    #[builder(into)]
    pub fingerprint: Option<String>,
    #[builder(into)]
    pub token: Option<String>,
    pub period: Option<PeriodType>,
    pub period_duration: Option<u32>,
    /// Trial terms, merged before `extra`.
    #[builder(default)]
    pub trial_data: Parameters,
    #[builder(default)]
    pub extra: Parameters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOperation {
    Detail,
    Cancel,
}

impl SubscriptionOperation {
    pub fn action(&self) -> Option<&'static str> {
        match self {
            SubscriptionOperation::Detail => None,
            SubscriptionOperation::Cancel => Some("cancel"),
        }
    }
}

impl Subscription {
    pub fn params(&self, config: &Config) -> Parameters {
        let amount = self.amount.map(|a| a.to_string()).unwrap_or_default();
        let period_duration = self
            .period_duration
            .map(|d| d.to_string())
            .unwrap_or_default();
        let mut params = Parameters::from([
            ("public_key", config.app_key.as_str()),
            ("amount", amount.as_str()),
            ("currency", self.currency.as_str()),
            ("description", optional(self.description.as_deref())),
            ("email", optional(self.email.as_deref())),
            ("fingerprint", optional(self.fingerprint.as_deref())),
            ("token", optional(self.token.as_deref())),
            ("period", self.period.map(|p| p.as_str()).unwrap_or_default()),
            ("period_duration", period_duration.as_str()),
        ]);
        params.merge(&self.trial_data);
        params.merge(&self.extra);
        params
    }

    pub fn create_request(&self, config: &Config) -> Result<BrickRequest> {
        BrickRequest::post(
            config,
            &config.brick.host,
            &config.brick.subscription_path,
            &self.params(config),
        )
    }

    /// Detail or cancel an existing subscription. The body is empty.
    pub fn operation_request(
        config: &Config,
        subscription_id: &str,
        operation: SubscriptionOperation,
    ) -> Result<BrickRequest> {
        BrickRequest::post(
            config,
            &config.brick.host,
            operation_path(
                config,
                &config.brick.subscription_path,
                subscription_id,
                operation.action(),
            )?,
            &Parameters::new(),
        )
    }

    pub async fn create<T: Transport>(
        &self,
        config: &Config,
        transport: &T,
    ) -> std::result::Result<Vec<BrickResponse>, BrickError<T::Error>>
    where
        T::Error: 'static,
    {
        dispatch(transport, self.create_request(config)?).await
    }

    pub async fn operation<T: Transport>(
        config: &Config,
        transport: &T,
        subscription_id: &str,
        operation: SubscriptionOperation,
    ) -> std::result::Result<Vec<BrickResponse>, BrickError<T::Error>>
    where
        T::Error: 'static,
    {
        dispatch(
            transport,
            Subscription::operation_request(config, subscription_id, operation)?,
        )
        .await
    }
}
