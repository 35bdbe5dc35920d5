// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HMAC-SHA256 webhook signatures.

use hmac::{Hmac, Mac};
use remedy_config::WebhookConfig;
use sha2::Sha256;
use tracing::warn;

use crate::error::{IngestError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload`.
pub fn compute_signature(secret: &[u8], payload: &[u8]) -> Result<String> {
	let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| IngestError::SecretNotConfigured)?;
	mac.update(payload);
	Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature over the exact body bytes.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature: &str) -> bool {
	let expected = match hex::decode(signature.trim()) {
		Ok(bytes) => bytes,
		Err(_) => return false,
	};

	let mut mac = match HmacSha256::new_from_slice(secret) {
		Ok(m) => m,
		Err(_) => return false,
	};

	mac.update(payload);
	mac.verify_slice(&expected).is_ok()
}

/// Authenticates a webhook request before its body is parsed.
///
/// Without a configured secret, production rejects every request while other
/// environments accept it with a warning.
pub fn verify_request(config: &WebhookConfig, body: &[u8], signature: Option<&str>) -> Result<()> {
	let Some(secret) = config.secret.as_ref() else {
		if config.environment.is_production() {
			return Err(IngestError::SecretNotConfigured);
		}
		warn!(
			environment = %config.environment,
			"webhook secret not configured, accepting unsigned request"
		);
		return Ok(());
	};

	let signature = signature
		.filter(|s| !s.is_empty())
		.ok_or(IngestError::MissingSignature)?;

	if verify_signature(secret.expose().as_bytes(), body, signature) {
		Ok(())
	} else {
		Err(IngestError::InvalidSignature)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use remedy_config::AppEnvironment;

	fn config(environment: AppEnvironment, secret: Option<&str>) -> WebhookConfig {
		WebhookConfig {
			environment,
			signature_header: "sentry-hook-signature".to_string(),
			secret: secret.map(Into::into),
		}
	}

	#[test]
	fn signature_is_64_hex_chars() {
		let sig = compute_signature(b"secret", b"{}").unwrap();
		assert_eq!(sig.len(), 64);
		assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
	}

	#[test]
	fn rejects_tampered_body() {
		let sig = compute_signature(b"secret", b"{\"a\":1}").unwrap();
		assert!(!verify_signature(b"secret", b"{\"a\": 1}", &sig));
	}

	#[test]
	fn rejects_non_hex_signature() {
		assert!(!verify_signature(b"secret", b"{}", "zz-not-hex"));
	}

	#[test]
	fn request_with_valid_signature_passes() {
		let body = br#"{"action":"created"}"#;
		let sig = compute_signature(b"whsec", body).unwrap();
		let config = config(AppEnvironment::Production, Some("whsec"));
		assert!(verify_request(&config, body, Some(&sig)).is_ok());
	}

	#[test]
	fn missing_signature_header_is_rejected() {
		let config = config(AppEnvironment::Development, Some("whsec"));
		assert!(matches!(
			verify_request(&config, b"{}", None),
			Err(IngestError::MissingSignature)
		));
		assert!(matches!(
			verify_request(&config, b"{}", Some("")),
			Err(IngestError::MissingSignature)
		));
	}

	#[test]
	fn production_without_secret_fails_closed() {
		let config = config(AppEnvironment::Production, None);
		let err = verify_request(&config, b"{}", Some("abc")).unwrap_err();
		assert!(matches!(err, IngestError::SecretNotConfigured));
		assert!(err.is_unauthorized());
	}

	#[test]
	fn development_without_secret_fails_open() {
		let config = config(AppEnvironment::Development, None);
		assert!(verify_request(&config, b"{}", None).is_ok());
	}

	proptest! {
		#[test]
		fn signed_payloads_verify(
			secret in proptest::collection::vec(any::<u8>(), 1..64),
			payload in proptest::collection::vec(any::<u8>(), 0..512)
		) {
			let sig = compute_signature(&secret, &payload).unwrap();
			prop_assert!(verify_signature(&secret, &payload, &sig));
		}

		#[test]
		fn wrong_secret_never_verifies(
			secret1 in proptest::collection::vec(any::<u8>(), 1..64),
			secret2 in proptest::collection::vec(any::<u8>(), 1..64),
			payload in proptest::collection::vec(any::<u8>(), 1..256)
		) {
			// HMAC zero-pads short keys, so keys differing only by trailing
			// zero bytes are equivalent.
			let strip = |s: &[u8]| s.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
			prop_assume!(secret1[..strip(&secret1)] != secret2[..strip(&secret2)]);
			let sig = compute_signature(&secret1, &payload).unwrap();
			prop_assert!(!verify_signature(&secret2, &payload, &sig));
		}
	}
}
