//! Flattened JSON 序列化的 JSON Web Signature (JWS)。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    base64::Base64,
    protection::ProtectedHeader,
    signature::{SignatureError, Signer},
};

/// 建立 JWS 時可能發生的錯誤。
#[derive(Error, Debug)]
pub enum JwsError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),
}

/// 送往 CA 的 `{protected, payload, signature}` 本文，三者皆為無填充 base64url。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Jws {
    pub protected: String,
    pub payload: String,
    pub signature: String,
}

impl Jws {
    /// 以 `protected64.payload64` 作為簽章輸入，交由 [`Signer`] 產生簽章。
    pub fn sign<S: Signer + ?Sized>(
        header: &ProtectedHeader,
        payload_b64: &Base64,
        signer: &S,
    ) -> Result<Self, JwsError> {
        let protected = header.to_base64()?.base64_url();
        let payload = payload_b64.base64_url();
        let signing_input = format!("{}.{}", protected, payload);
        let signature = signer.sign(signing_input.as_bytes())?;

        Ok(Jws {
            protected,
            payload,
            signature: Base64::new(signature).base64_url(),
        })
    }

    pub fn to_json(&self) -> Result<String, JwsError> {
        Ok(serde_json::to_string(self)?)
    }

    /// 解碼受保護標頭，主要用於診斷與測試。
    pub fn header(&self) -> Option<ProtectedHeader> {
        let raw = Base64::decode_url(&self.protected).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// 解碼 payload；空字串代表 POST-as-GET。
    pub fn payload_json(&self) -> Option<serde_json::Value> {
        let raw = Base64::decode_url(&self.payload).ok()?;
        serde_json::from_slice(&raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use openssl::{hash::MessageDigest, pkey::PKey, rsa::Rsa, sign::Verifier};

    use super::*;
    use crate::{nonce::Nonce, protection::KeyId, signature::OpensslSigner};

    #[test]
    fn test_sign_and_verify() -> Result<(), JwsError> {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let header = ProtectedHeader::new(
            "https://ca.test/chall/1",
            Nonce::new("n-9"),
            KeyId::Kid("https://ca.test/acct/1"),
        );
        let payload = Base64::new("{}");

        let jws = Jws::sign(&header, &payload, &OpensslSigner::new(key.clone()))?;
        assert_eq!(jws.payload, "e30");
        assert!(!jws.signature.contains('='));
        assert_eq!(jws.header(), Some(header));

        let signature = Base64::decode_url(&jws.signature).unwrap();
        let mut verifier = Verifier::new(MessageDigest::sha256(), &key).unwrap();
        verifier
            .update(format!("{}.{}", jws.protected, jws.payload).as_bytes())
            .unwrap();
        assert!(verifier.verify(&signature).unwrap());

        let json: serde_json::Value = serde_json::from_str(&jws.to_json()?)?;
        assert!(json.get("protected").is_some());
        assert!(json.get("signature").is_some());
        Ok(())
    }
}
