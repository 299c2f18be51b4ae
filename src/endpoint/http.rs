//! OAuth2/OIDC implementation of the identity endpoint over `reqwest`.
//!
//! Speaks the form-encoded token protocol of an OIDC provider laid out as
//! `{issuer}/protocol/openid-connect/{token,logout,auth}`. Redirects are
//! never followed: the silent SSO check inspects the provider's redirect
//! `Location` itself, and the client's cookie store is what carries the
//! provider session between checks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, redirect, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{pkce, EndpointError, IdentityEndpoint, TokenGrant};
use crate::config::AuthConfig;
use crate::utils::{param, parse_params};

/// OAuth2 error body: `{error, error_description}`
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

#[derive(Clone)]
pub struct HttpIdentityEndpoint {
    client: Client,
    issuer_url: String,
    client_id: String,
    redirect_uri: String,
}

impl HttpIdentityEndpoint {
    pub fn new(config: &AuthConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(redirect::Policy::none())
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            issuer_url: config.issuer_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.issuer_url)
    }

    fn logout_url(&self) -> String {
        format!("{}/protocol/openid-connect/logout", self.issuer_url)
    }

    fn auth_url(&self) -> String {
        format!("{}/protocol/openid-connect/auth", self.issuer_url)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, EndpointError> {
        let response = self
            .client
            .post(self.token_url())
            .header(header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| EndpointError::InvalidResponse(format!("bad token response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        Err(Self::grant_error(status, &body))
    }

    /// Map a non-success token response to a typed error. `invalid_grant` is
    /// distinguished so direct login can report invalid credentials.
    fn grant_error(status: StatusCode, body: &str) -> EndpointError {
        match serde_json::from_str::<OAuthErrorBody>(body) {
            Ok(oauth) if oauth.error == "invalid_grant" => {
                EndpointError::InvalidGrant(oauth.error_description)
            }
            Ok(oauth) => EndpointError::Rejected {
                status: status.as_u16(),
                error: oauth.error,
                description: oauth.error_description,
            },
            Err(_) => EndpointError::Rejected {
                status: status.as_u16(),
                error: "unknown".to_string(),
                description: body.chars().take(200).collect(),
            },
        }
    }

    fn build_authorize_url(
        &self,
        state: &str,
        code_challenge: &str,
        redirect_uri: &str,
        prompt_none: bool,
    ) -> String {
        let mut url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid&state={}&code_challenge={}&code_challenge_method=S256",
            self.auth_url(),
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        );
        if prompt_none {
            url.push_str("&prompt=none");
        }
        url
    }
}

#[async_trait]
impl IdentityEndpoint for HttpIdentityEndpoint {
    async fn login(&self, username: &str, password: &str) -> Result<TokenGrant, EndpointError> {
        self.token_request(&[
            ("grant_type", "password"),
            ("client_id", &self.client_id),
            ("scope", "openid"),
            ("username", username),
            ("password", password),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, EndpointError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("client_id", &self.client_id),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenGrant, EndpointError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("client_id", &self.client_id),
            ("code", code),
            ("code_verifier", verifier),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), EndpointError> {
        let response = self
            .client
            .post(self.logout_url())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(Self::grant_error(status, &body))
        }
    }

    async fn silent_check(&self) -> Result<Option<TokenGrant>, EndpointError> {
        // prompt=none authorization request: the provider must answer with a
        // redirect either way - a code when its session cookie is valid, an
        // error such as login_required when it is not.
        let verifier = pkce::verifier();
        let state = pkce::state();
        let url = self.build_authorize_url(
            &state,
            &pkce::challenge(&verifier),
            &self.redirect_uri,
            true,
        );

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let Some(location) = location else {
            debug!(status = %status, "Silent SSO check got no redirect; treating as not logged in");
            return Ok(None);
        };

        let params = parse_params(crate::utils::query_of(&location).unwrap_or_default());
        if param(&params, "state") != Some(state.as_str()) {
            warn!("Silent SSO check redirect carried a mismatched state; ignoring");
            return Ok(None);
        }
        match (param(&params, "code"), param(&params, "error")) {
            (Some(code), _) => {
                let grant = self
                    .exchange_code(code, &verifier, &self.redirect_uri)
                    .await?;
                Ok(Some(grant))
            }
            (None, Some(error)) => {
                debug!(error = %error, "Silent SSO check: no provider session");
                Ok(None)
            }
            (None, None) => Ok(None),
        }
    }

    fn authorize_url(&self, state: &str, code_challenge: &str, redirect_uri: &str) -> String {
        self.build_authorize_url(state, code_challenge, redirect_uri, false)
    }
}
