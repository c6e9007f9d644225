use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Issues and checks channel/user authorization tokens.
#[derive(Clone)]
pub struct ChannelSigner {
    key: String,
    secret: Vec<u8>,
}

impl ChannelSigner {
    pub fn new(key: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.into(),
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Token for subscribing `socket_id` to `channel`. Presence channels must
    /// pass the exact `channel_data` string the client will present.
    pub fn sign_channel(&self, socket_id: &str, channel: &str, channel_data: Option<&str>) -> String {
        let signature = self.signature(&channel_string(socket_id, channel, channel_data));
        format!("{}:{}", self.key, signature)
    }

    /// Token binding a user identity to a connection.
    pub fn sign_user(&self, socket_id: &str, user_data: &str) -> String {
        let signature = self.signature(&format!("{socket_id}::user::{user_data}"));
        format!("{}:{}", self.key, signature)
    }

    pub fn verify_channel(
        &self,
        auth: &str,
        socket_id: &str,
        channel: &str,
        channel_data: Option<&str>,
    ) -> bool {
        let Some((key, signature)) = auth.split_once(':') else {
            return false;
        };
        if key != self.key {
            return false;
        }
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };

        let mut mac = self.mac();
        mac.update(channel_string(socket_id, channel, channel_data).as_bytes());
        mac.verify_slice(&signature).is_ok()
    }

    fn signature(&self, message: &str) -> String {
        let mut mac = self.mac();
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length")
    }
}

fn channel_string(socket_id: &str, channel: &str, channel_data: Option<&str>) -> String {
    match channel_data {
        Some(data) => format!("{socket_id}:{channel}:{data}"),
        None => format!("{socket_id}:{channel}"),
    }
}

/// Socket ids are two dot-separated decimal numbers, e.g. `1234.5678`.
pub fn is_valid_socket_id(socket_id: &str) -> bool {
    match socket_id.split_once('.') {
        Some((a, b)) => {
            !a.is_empty()
                && !b.is_empty()
                && a.bytes().all(|c| c.is_ascii_digit())
                && b.bytes().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_channel_tokens_verify() {
        let signer = ChannelSigner::new("askq", "secret");
        let auth = signer.sign_channel("1.2", "private-room", None);
        assert!(auth.starts_with("askq:"));
        assert!(signer.verify_channel(&auth, "1.2", "private-room", None));
    }

    #[test]
    fn tokens_are_bound_to_socket_channel_and_data() {
        let signer = ChannelSigner::new("askq", "secret");
        let data = r#"{"user_id":"abc","user_info":{}}"#;
        let auth = signer.sign_channel("1.2", "presence-user-x", Some(data));

        assert!(signer.verify_channel(&auth, "1.2", "presence-user-x", Some(data)));
        assert!(!signer.verify_channel(&auth, "1.3", "presence-user-x", Some(data)));
        assert!(!signer.verify_channel(&auth, "1.2", "presence-user-y", Some(data)));
        assert!(!signer.verify_channel(&auth, "1.2", "presence-user-x", Some("{}")));
        assert!(!signer.verify_channel(&auth, "1.2", "presence-user-x", None));
    }

    #[test]
    fn foreign_keys_and_secrets_are_rejected() {
        let ours = ChannelSigner::new("askq", "secret");
        let theirs = ChannelSigner::new("askq", "other-secret");
        let auth = theirs.sign_channel("1.2", "private-room", None);
        assert!(!ours.verify_channel(&auth, "1.2", "private-room", None));

        let rekeyed = auth.replacen("askq", "nope", 1);
        assert!(!theirs.verify_channel(&rekeyed, "1.2", "private-room", None));
        assert!(!ours.verify_channel("garbage", "1.2", "private-room", None));
    }

    #[test]
    fn socket_id_shape() {
        assert!(is_valid_socket_id("123.456"));
        assert!(!is_valid_socket_id("123"));
        assert!(!is_valid_socket_id("a.1"));
        assert!(!is_valid_socket_id(".1"));
    }
}
