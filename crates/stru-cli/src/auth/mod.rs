//! Login and logout against the identity service
//!
//! Login is redirect based: the browser goes through `/login`, and the session
//! token shown at the end of the flow is pasted back into the terminal.

mod storage;

pub use storage::{
    Credentials, credentials_file, load_credentials, remove_credentials, save_credentials,
};

use anyhow::{Context, anyhow, bail};
use stru_api::{IdentityClient, SessionContext, UserInfo};

/// Try to open a URL in the user's browser
pub fn open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    let _ = std::process::Command::new("open").arg(url).spawn();
    #[cfg(target_os = "linux")]
    let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    #[cfg(target_os = "windows")]
    let _ = std::process::Command::new("cmd")
        .args(["/C", "start", url])
        .spawn();
}

/// Log in and verify the resulting token.
///
/// # Arguments
/// * `on_login_url` - Called with the URL to open in a browser
/// * `on_prompt_token` - Called to get the session token from the user
pub async fn login<F, G, Fut>(
    identity: &IdentityClient,
    on_login_url: F,
    on_prompt_token: G,
) -> anyhow::Result<(Credentials, UserInfo)>
where
    F: FnOnce(String),
    G: FnOnce() -> Fut,
    Fut: std::future::Future<Output = String>,
{
    on_login_url(identity.login_url());

    let token = on_prompt_token().await;
    let token = token.trim();
    if token.is_empty() {
        bail!("No session token entered");
    }

    verify_token(identity, token).await
}

/// Check a token against `/user_info`
pub async fn verify_token(
    identity: &IdentityClient,
    token: &str,
) -> anyhow::Result<(Credentials, UserInfo)> {
    let candidate = SessionContext::new("login").with_token(token);
    let info = identity
        .user_info(&candidate)
        .await
        .context("Failed to reach the identity service")?
        .ok_or_else(|| anyhow!("The service did not accept that session token"))?;

    let credentials = Credentials::new(token.to_string(), info.email.clone());
    Ok((credentials, info))
}

/// End the server-side session and forget the local token.
///
/// Local credentials are removed even if the server call fails.
pub async fn logout(identity: &IdentityClient, credentials: &Credentials) -> anyhow::Result<()> {
    let session = SessionContext::new(credentials.user_id.clone().unwrap_or_default())
        .with_token(credentials.token.clone());

    let remote = identity.logout(&session).await;
    remove_credentials().context("Failed to remove saved credentials")?;
    remote.context("Server-side logout failed")?;
    Ok(())
}
