use anyhow::{Context, Result, bail};

use etra_types::{AllowList, Participant};

/// One of the two accounts the server provisions at startup.
#[derive(Debug, Clone)]
pub struct SeedUser {
    pub email: String,
    pub name: String,
    /// When set, the account is created with (or reset to) this password.
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: String,
    pub host: String,
    pub port: u16,
    pub users: [SeedUser; 2],
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("ETRA_JWT_SECRET").unwrap_or_else(|| "dev-secret-change-me".into());
        let db_path = lookup("ETRA_DB_PATH").unwrap_or_else(|| "etra.db".into());
        let host = lookup("ETRA_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = lookup("ETRA_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("ETRA_PORT is not a valid port")?;

        let users = [seed_user(&lookup, "A")?, seed_user(&lookup, "B")?];
        if users[0].email == users[1].email {
            bail!("ETRA_USER_A_EMAIL and ETRA_USER_B_EMAIL must differ");
        }

        Ok(Self {
            jwt_secret,
            db_path,
            host,
            port,
            users,
        })
    }

    pub fn allow_list(&self) -> AllowList {
        let [a, b] = &self.users;
        AllowList::new(
            Participant::new(&a.email, &a.name),
            Participant::new(&b.email, &b.name),
        )
    }
}

fn seed_user(lookup: &impl Fn(&str) -> Option<String>, slot: &str) -> Result<SeedUser> {
    let email_key = format!("ETRA_USER_{slot}_EMAIL");
    let email = lookup(&email_key)
        .filter(|e| !e.trim().is_empty())
        .with_context(|| format!("{email_key} must be set"))?
        .trim()
        .to_lowercase();

    let name = lookup(&format!("ETRA_USER_{slot}_NAME"))
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

    let password = lookup(&format!("ETRA_USER_{slot}_PASSWORD")).filter(|p| !p.is_empty());

    Ok(SeedUser {
        email,
        name,
        password,
    })
}
