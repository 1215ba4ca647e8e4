use serde::{Serialize, Deserialize};

/// Who is knocking, as far as rate limiting is concerned. Unrelated to the
/// voter identity, which only comes from a verified claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub fingerprint: String,
    pub ip: String,
}

impl ClientInfo {
    pub fn rate_key(&self, scope: &str) -> String {
        format!("{scope}:{}", self.fingerprint)
    }
}

pub fn client_fingerprint(ip: &str, user_agent: Option<&str>) -> String {
    use base64::engine::general_purpose::URL_SAFE;
    use base64::Engine;
    use sha2::{Sha256, Digest};

    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    if let Some(ua) = user_agent {
        hasher.update(b"|");
        hasher.update(ua.as_bytes());
    }
    URL_SAFE.encode(hasher.finalize())
}

#[cfg(feature = "backend")]
mod backend_impl {
    use super::*;
    use rocket::request::{FromRequest, Outcome};
    use rocket::Request;

    #[rocket::async_trait]
    impl<'r> FromRequest<'r> for ClientInfo {
        type Error = ();

        async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
            // Proxy headers are only trusted through Rocket's configured `ip_header`.
            let ip = req.client_ip()
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string());

            let fingerprint = client_fingerprint(&ip, req.headers().get_one("User-Agent"));

            Outcome::Success(ClientInfo { fingerprint, ip })
        }
    }
}
