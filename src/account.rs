//! Account commands and the access guard used before every data view.

use anyhow::{Context, Result};

use crate::api::{ApiClient, ApiError};
use crate::render::Style;
use crate::schema::Me;
use crate::session::{Access, SessionHandle};

/// Environment variable read instead of prompting for a password.
pub const PASSWORD_ENV: &str = "KBD_PASSWORD";

/// Fail with a hint unless the session may open a data view.
///
/// `allow_must_change` is true only for the password change itself.
pub fn require_access(session: &SessionHandle, allow_must_change: bool) -> Result<()> {
    match session.access(allow_must_change) {
        Access::Granted => Ok(()),
        Access::NeedsLogin => anyhow::bail!("Not signed in. Run `kbd login <email>` first."),
        Access::Blocked => {
            anyhow::bail!("This account is blocked. Contact an administrator.")
        }
        Access::NeedsPasswordChange => {
            anyhow::bail!("You must change your password first. Run `kbd passwd`.")
        }
    }
}

/// Read a secret from `KBD_PASSWORD` or, failing that, from the terminal
/// without echo.
fn read_secret(prompt: &str) -> Result<String> {
    secret_or_prompt(std::env::var(PASSWORD_ENV).ok(), prompt)
}

fn secret_or_prompt(preset: Option<String>, prompt: &str) -> Result<String> {
    match preset {
        Some(value) => Ok(value),
        None => prompt_hidden(prompt),
    }
}

fn prompt_hidden(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt)
        .with_context(|| format!("No input for '{}'", prompt.trim()))
}

fn read_line(prompt: &str) -> Result<String> {
    let mut editor = rustyline::DefaultEditor::new().context("Failed to open terminal")?;
    Ok(editor.readline(prompt)?.trim().to_string())
}

pub fn describe_me(me: &Me, style: &Style) -> String {
    let mut out = format!("{} <{}>\n", style.bold(&me.display_name), me.email);
    let mut flags = Vec::new();
    if me.is_admin {
        flags.push("admin");
    }
    if me.is_blocked {
        flags.push("blocked");
    }
    if me.must_change_password {
        flags.push("must change password");
    }
    if !flags.is_empty() {
        out.push_str(&style.dim(&flags.join(", ")));
        out.push('\n');
    }
    out
}

/// `kbd login <email>`
pub async fn run_login(client: &ApiClient, email: &str) -> Result<()> {
    let style = Style::new();
    let password = read_secret("Password: ")?;
    let token = match client.login(email, &password).await {
        Ok(token) => token,
        Err(ApiError::AccountBlocked) => {
            anyhow::bail!("This account is blocked. Contact an administrator.")
        }
        Err(e) => return Err(e).context("Sign-in failed"),
    };
    println!("{}", style.ok(&format!("Signed in as {email}")));
    if token.must_change_password {
        println!(
            "{}",
            style.warn("A password change is required before continuing. Run `kbd passwd`.")
        );
    }
    Ok(())
}

/// `kbd logout`
pub async fn run_logout(client: &ApiClient) -> Result<()> {
    if client.session().token().is_none() {
        println!("Not signed in.");
        return Ok(());
    }
    if let Err(e) = client.logout().await {
        // The local token is gone either way.
        tracing::warn!(error = %e, "server-side logout failed");
    }
    println!("Signed out.");
    Ok(())
}

/// `kbd register <email> [--name <display name>]`
pub async fn run_register(
    client: &ApiClient,
    email: &str,
    display_name: Option<String>,
) -> Result<()> {
    let style = Style::new();
    let display_name = match display_name {
        Some(name) => name,
        None => read_line("Display name: ")?,
    };
    let password = read_secret("Password: ")?;
    let confirm = match std::env::var(PASSWORD_ENV) {
        Ok(_) => password.clone(),
        Err(_) => read_secret("Repeat password: ")?,
    };
    if password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    let me = client
        .register(email, &display_name, &password, &confirm)
        .await
        .context("Registration failed")?;
    println!("{}", style.ok(&format!("Registered {}", me.email)));
    println!("Sign in with `kbd login {}`.", me.email);
    Ok(())
}

/// `kbd me [--display-name <name>]`
pub async fn run_me(
    client: &ApiClient,
    display_name: Option<String>,
) -> Result<()> {
    require_access(client.session(), true)?;
    let style = Style::new();
    let me = match display_name {
        Some(name) => client
            .update_profile(name.trim())
            .await
            .context("Failed to update profile")?,
        None => client.me().await.context("Failed to load profile")?,
    };
    print!("{}", describe_me(&me, &style));
    Ok(())
}

/// `kbd passwd`
pub async fn run_passwd(client: &ApiClient) -> Result<()> {
    require_access(client.session(), true)?;
    let style = Style::new();
    let old_password = read_secret("Current password: ")?;
    // New passwords are always typed; `KBD_PASSWORD` only supplies the current one.
    let new_password = prompt_hidden("New password: ")?;
    let confirm = prompt_hidden("Repeat new password: ")?;
    if new_password != confirm {
        anyhow::bail!("Passwords do not match");
    }
    client
        .change_password(&old_password, &new_password, &confirm)
        .await
        .context("Password change failed")?;
    println!("{}", style.ok("Password changed."));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TokenResponse;
    use crate::session::Transition;

    fn token(must_change: bool) -> TokenResponse {
        TokenResponse {
            access_token: "t".into(),
            token_type: "bearer".into(),
            must_change_password: must_change,
        }
    }

    #[test]
    fn test_guard_messages() {
        let session = SessionHandle::ephemeral();
        let err = require_access(&session, false).unwrap_err();
        assert!(err.to_string().contains("kbd login"));

        session.login(&token(true));
        let err = require_access(&session, false).unwrap_err();
        assert!(err.to_string().contains("kbd passwd"));
        assert!(require_access(&session, true).is_ok());

        session.apply(Transition::Blocked);
        let err = require_access(&session, true).unwrap_err();
        assert!(err.to_string().contains("blocked"));
    }

    #[test]
    fn test_preset_secret_skips_prompt() {
        let secret = secret_or_prompt(Some("from-env".into()), "Password: ").unwrap();
        assert_eq!(secret, "from-env");
    }

    #[test]
    fn test_describe_me_flags() {
        let me = Me {
            id: 3,
            email: "ann@example.org".into(),
            display_name: "Ann".into(),
            is_admin: true,
            is_blocked: false,
            must_change_password: true,
        };
        let out = describe_me(&me, &Style::plain());
        assert!(out.starts_with("Ann <ann@example.org>"));
        assert!(out.contains("admin, must change password"));
    }
}
