//! ACME 帳戶註冊與聯絡資訊更新。

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    client::{AcmeClient, RequestError},
    payload::{NewAccountPayload, UpdateContactPayload},
    protection::KeyId,
    session::Session,
    signature::Signer,
    transport::Transport,
};

/// 帳戶操作可能發生的錯誤。
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account request failed: {0}")]
    Request(#[from] RequestError),
    /// CA 接受請求卻沒有回傳帳戶 URL。
    #[error("newAccount response from {0} has no Location header")]
    MissingLocation(String),
}

pub type Result<T> = std::result::Result<T, AccountError>;

/// 帳戶註冊結果。
#[derive(Debug)]
pub struct Registration {
    /// 帳戶 URL，之後作為 `kid` 使用。
    pub location: String,
    /// `true` 表示本次新建帳戶（HTTP 201），`false` 表示 CA 認得既有帳戶。
    pub created: bool,
    /// 聯絡資訊更新失敗時的錯誤；帳戶本身仍然有效。
    pub contact_error: Option<RequestError>,
}

/// 確保帳戶存在，並在提供聯絡資訊時更新它。
///
/// 以 `jwk` 簽署 `{"termsOfServiceAgreed": true}` 送往 `newAccount`，
/// 聯絡資訊則以帳戶 URL 作為 `kid` 另外送出。聯絡資訊更新失敗只會記錄在
/// [`Registration::contact_error`]，不影響已建立的帳戶。
///
/// # 錯誤
///
/// `newAccount` 請求失敗或回應缺少 `Location` 標頭時回傳 [`AccountError`]。
pub fn ensure_account<T, S>(
    client: &mut AcmeClient<T, S>,
    session: &Session,
    contact: &[String],
) -> Result<Registration>
where
    T: Transport,
    S: Signer,
{
    let url = &session.directory().new_account;
    let response = client.signed_request(url, &NewAccountPayload::new(), session.key_id())?;

    let created = response.status == StatusCode::CREATED;
    let location = response
        .location()
        .map(str::to_string)
        .ok_or_else(|| AccountError::MissingLocation(url.clone()))?;

    if created {
        info!(account = %location, "ACME account created");
    } else {
        info!(account = %location, "existing ACME account recognized");
    }

    let contact_error = if contact.is_empty() {
        None
    } else {
        update_contact(client, &location, contact).err()
    };

    Ok(Registration {
        location,
        created,
        contact_error,
    })
}

fn update_contact<T: Transport, S: Signer>(
    client: &mut AcmeClient<T, S>,
    location: &str,
    contact: &[String],
) -> std::result::Result<(), RequestError> {
    let payload = UpdateContactPayload::new(contact);
    match client.signed_request(location, &payload, KeyId::Kid(location)) {
        Ok(_) => {
            info!(account = %location, contact = ?payload.contact, "account contact updated");
            Ok(())
        }
        Err(err) => {
            warn!(account = %location, error = %err, "failed to update account contact");
            Err(err)
        }
    }
}
