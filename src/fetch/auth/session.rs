use crate::config::Credential;
use crate::fetch::client::HttpClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT,
};

const CIPHER_TEXT: HeaderName = HeaderName::from_static("cipher-text");

const REFERER_URL: &str = "https://index.baidu.com/v2/main/index.html";
const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.3";

/// An [`HttpClient`] wrapper that attaches a logged-in session to every request.
///
/// Besides the session cookie and the `Cipher-Text` token, the service
/// expects the headers a browser on the index page would send.
pub struct SessionHeaders<C> {
    pub inner: C,
    headers: HeaderMap,
}

impl<C> SessionHeaders<C> {
    /// Fails if the credential contains bytes that are not valid in a header.
    pub fn new(inner: C, credential: &Credential) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("BDUSS={}", credential.session_cookie))
                .context("session cookie is not a valid header value")?,
        );
        headers.insert(
            CIPHER_TEXT,
            HeaderValue::from_str(&credential.cipher_text)
                .context("cipher text is not a valid header value")?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("zh-CN,zh;q=0.9"));
        headers.insert(REFERER, HeaderValue::from_static(REFERER_URL));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));

        Ok(Self { inner, headers })
    }

    fn apply(&self, req: &mut reqwest::Request) {
        for (name, value) in &self.headers {
            req.headers_mut().insert(name.clone(), value.clone());
        }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for SessionHeaders<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.apply(&mut req);
        self.inner.execute(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::BasicClient;

    fn credential(cookie: &str) -> Credential {
        Credential {
            session_cookie: cookie.to_string(),
            cipher_text: "1700000000000_abc".to_string(),
        }
    }

    #[test]
    fn test_headers_applied() {
        let session = SessionHeaders::new(BasicClient::new(), &credential("token")).unwrap();
        let mut req = reqwest::Request::new(
            reqwest::Method::GET,
            "https://index.baidu.com/Interface/ptbk?uniqid=1".parse().unwrap(),
        );

        session.apply(&mut req);

        assert_eq!(req.headers()[COOKIE], "BDUSS=token");
        assert_eq!(req.headers()["Cipher-Text"], "1700000000000_abc");
        assert_eq!(req.headers()[REFERER], REFERER_URL);
    }

    #[test]
    fn test_invalid_cookie_rejected() {
        assert!(SessionHeaders::new(BasicClient::new(), &credential("bad\nvalue")).is_err());
    }
}
