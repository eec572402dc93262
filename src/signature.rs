//! Signature computation for widget requests and pingbacks.
//!
//! Both versions are pure functions of `(params, secret, version)`:
//!
//! | Version | Input | Digest |
//! |---------|-------|--------|
//! | V1 | values of a fixed field list, in that list's order, then the secret | MD5 |
//! | V2 | every `key=value` pair sorted by key, signature key excluded | HMAC-SHA256 keyed by the secret |
//!
//! Digests are rendered as lowercase hex.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::types::{AccountType, Parameters, SignatureVersion};

/// HMAC-SHA256 type alias.
pub type HmacSha256 = Hmac<Sha256>;

/// Signature parameter of widget URLs.
pub const WIDGET_SIGNATURE_KEY: &str = "sign";
/// Signature parameter of pingbacks.
pub const PINGBACK_SIGNATURE_KEY: &str = "sig";
/// Parameter carrying the signature version code.
pub const SIGN_VERSION_KEY: &str = "sign_version";

/// The fields a signature covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedFields {
    /// Fields concatenated by V1, in signing order.
    pub v1_fields: &'static [&'static str],
    /// Parameter that carries the signature. Never part of the signed data.
    pub signature_key: &'static str,
}

impl SignedFields {
    pub const WIDGET: SignedFields = SignedFields {
        v1_fields: &["uid"],
        signature_key: WIDGET_SIGNATURE_KEY,
    };

    /// Fields signed by the platform on pingbacks for the given account type.
    pub fn pingback(account_type: AccountType, brick: bool) -> SignedFields {
        let v1_fields: &'static [&'static str] = match (account_type, brick) {
            (AccountType::VirtualCurrency, _) => &["uid", "currency", "type", "ref"],
            (AccountType::DigitalGoods, true) => &["uid", "slength", "speriod", "type", "ref"],
            (AccountType::DigitalGoods, false) => {
                &["uid", "goodsid", "slength", "speriod", "type", "ref"]
            }
            (AccountType::Cart, _) => &["uid", "goodsid", "type", "ref"],
        };

        SignedFields {
            v1_fields,
            signature_key: PINGBACK_SIGNATURE_KEY,
        }
    }
}

/// Computes the signature of `params` with the given version.
pub fn sign(
    params: &Parameters,
    secret: &str,
    version: SignatureVersion,
    fields: &SignedFields,
) -> String {
    match version {
        SignatureVersion::V1 => sign_v1(params, fields.v1_fields, secret),
        SignatureVersion::V2 => sign_v2(params, secret, fields.signature_key),
    }
}

/// MD5 over the values of `fields` in the given order followed by `secret`.
///
/// Missing fields contribute the empty string.
pub fn sign_v1(params: &Parameters, fields: &[&str], secret: &str) -> String {
    let mut base = String::new();
    for field in fields {
        base.push_str(params.get(field).unwrap_or_default());
    }
    base.push_str(secret);

    format!("{:x}", md5::compute(base.as_bytes()))
}

/// HMAC-SHA256 keyed by `secret` over `key=value` pairs in byte-wise key order.
///
/// `signature_key` is skipped if present.
pub fn sign_v2(params: &Parameters, secret: &str, signature_key: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take a key of any size");

    // Parameters iterates in byte-wise key order.
    for (key, value) in params.iter().filter(|(key, _)| key.as_str() != signature_key) {
        mac.update(key.as_bytes());
        mac.update(b"=");
        mac.update(value.as_bytes());
    }

    hex::encode(mac.finalize().into_bytes())
}

/// Recomputes the signature and compares it with `claimed` in constant time.
pub fn verify(
    params: &Parameters,
    secret: &str,
    version: SignatureVersion,
    fields: &SignedFields,
    claimed: &str,
) -> bool {
    let expected = sign(params, secret, version, fields);
    expected.as_bytes().ct_eq(claimed.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vc_params() -> Parameters {
        Parameters::from([("uid", "1"), ("currency", "USD"), ("type", "0"), ("ref", "abc")])
    }

    #[test]
    fn test_v1_concatenates_in_field_order() {
        let fields = SignedFields::pingback(AccountType::VirtualCurrency, false);
        let signature = sign(&vc_params(), "mySecret", SignatureVersion::V1, &fields);

        assert_eq!(
            signature,
            format!("{:x}", md5::compute(b"1USD0abcmySecret"))
        );
        assert_eq!(signature.len(), 32);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_v1_missing_fields_are_empty() {
        let params = Parameters::from([("uid", "1"), ("ref", "abc")]);
        let signature = sign_v1(&params, &["uid", "currency", "type", "ref"], "s");
        assert_eq!(signature, format!("{:x}", md5::compute(b"1abcs")));
    }

    #[test]
    fn test_v1_ignores_unlisted_fields() {
        let mut params = vc_params();
        params.insert("extra", "ignored");
        let fields = SignedFields::pingback(AccountType::VirtualCurrency, false);
        assert_eq!(
            sign(&params, "mySecret", SignatureVersion::V1, &fields),
            sign(&vc_params(), "mySecret", SignatureVersion::V1, &fields)
        );
    }

    #[test]
    fn test_v2_matches_manual_hmac() {
        let params = Parameters::from([("uid", "1"), ("b", "2"), ("a", "x y")]);
        let signature = sign_v2(&params, "secret", PINGBACK_SIGNATURE_KEY);

        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"a=x yb=2uid=1");
        assert_eq!(signature, hex::encode(mac.finalize().into_bytes()));
    }

    #[test]
    fn test_v2_is_insertion_order_independent() {
        let forward: Parameters = [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        let backward: Parameters = [("c", "3"), ("b", "2"), ("a", "1")].into_iter().collect();
        assert_eq!(
            sign(&forward, "k", SignatureVersion::V2, &SignedFields::WIDGET),
            sign(&backward, "k", SignatureVersion::V2, &SignedFields::WIDGET)
        );
    }

    #[test]
    fn test_v2_excludes_signature_key() {
        let params = Parameters::from([("uid", "1")]);
        let with_sig = params.clone().with("sig", "whatever");
        assert_eq!(
            sign_v2(&params, "k", "sig"),
            sign_v2(&with_sig, "k", "sig")
        );
        assert_ne!(sign_v2(&params, "k", "sig"), sign_v2(&with_sig, "k", "sign"));
    }

    #[test]
    fn test_sign_is_deterministic() {
        let fields = SignedFields::pingback(AccountType::DigitalGoods, false);
        for version in [SignatureVersion::V1, SignatureVersion::V2] {
            assert_eq!(
                sign(&vc_params(), "s", version, &fields),
                sign(&vc_params(), "s", version, &fields)
            );
        }
    }

    #[test]
    fn test_verify() {
        let fields = SignedFields::pingback(AccountType::VirtualCurrency, false);
        let good = sign(&vc_params(), "mySecret", SignatureVersion::V1, &fields);
        assert!(verify(&vc_params(), "mySecret", SignatureVersion::V1, &fields, &good));
        assert!(!verify(&vc_params(), "other", SignatureVersion::V1, &fields, &good));
        assert!(!verify(&vc_params(), "mySecret", SignatureVersion::V1, &fields, ""));
        assert!(!verify(
            &vc_params(),
            "mySecret",
            SignatureVersion::V1,
            &fields,
            &good.to_uppercase()
        ));
    }

    #[test]
    fn test_pingback_field_sets() {
        assert_eq!(
            SignedFields::pingback(AccountType::DigitalGoods, true).v1_fields,
            &["uid", "slength", "speriod", "type", "ref"]
        );
        assert_eq!(
            SignedFields::pingback(AccountType::DigitalGoods, false).v1_fields,
            &["uid", "goodsid", "slength", "speriod", "type", "ref"]
        );
        assert_eq!(SignedFields::WIDGET.signature_key, "sign");
    }
}
