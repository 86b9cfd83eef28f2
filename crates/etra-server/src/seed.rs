use anyhow::Result;
use tracing::{info, warn};
use uuid::Uuid;

use etra_api::auth::hash_password;
use etra_db::Database;
use etra_db::models::{UserRow, timestamp};

use crate::config::SeedUser;

/// Make sure both participants exist. An account that already exists keeps
/// its id and gets its password reset when one is configured.
pub fn seed_users(db: &Database, users: &[SeedUser]) -> Result<()> {
    for user in users {
        let existing = db.get_user_by_email(&user.email)?;

        match (existing, &user.password) {
            (Some(_), Some(password)) => {
                db.update_user_password(&user.email, &hash_password(password)?)?;
                info!("Updated password for {}", user.email);
            }
            (Some(_), None) => {}
            (None, Some(password)) => {
                db.create_user(&UserRow {
                    id: Uuid::new_v4().to_string(),
                    email: user.email.clone(),
                    name: user.name.clone(),
                    password: hash_password(password)?,
                    created_at: timestamp(chrono::Utc::now()),
                })?;
                info!("Created account for {}", user.email);
            }
            (None, None) => {
                warn!(
                    "{} has no account and no password configured; they cannot log in",
                    user.email
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str, password: Option<&str>) -> SeedUser {
        SeedUser {
            email: email.into(),
            name: "Someone".into(),
            password: password.map(Into::into),
        }
    }

    #[test]
    fn creates_then_resets_password_keeping_id() {
        let db = Database::open_in_memory().unwrap();

        seed_users(&db, &[user("a@example.com", Some("first")), user("b@example.com", None)]).unwrap();
        let created = db.get_user_by_email("a@example.com").unwrap().unwrap();
        assert!(db.get_user_by_email("b@example.com").unwrap().is_none());

        seed_users(&db, &[user("a@example.com", Some("second"))]).unwrap();
        let updated = db.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(created.id, updated.id);
        assert_ne!(created.password, updated.password);
    }
}
