//! Shared fixtures for the admin integration tests

#![allow(dead_code)]

use admin::{
    AdminCore,
    catalog,
    mailer::Mailer,
    models::{NewRole, NewUser, Permission, Role, User},
    settings::Settings,
    store::{MemoryStore, SharedStore},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const PASSWORD: &str = "Str0ng!Pass";

/// One captured outgoing message
#[derive(Debug, Clone)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

struct ChannelMailer(mpsc::UnboundedSender<Mail>);

#[async_trait]
impl Mailer for ChannelMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.0.send(Mail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })?;
        Ok(())
    }
}

pub struct Harness {
    pub core: AdminCore,
    pub outbox: mpsc::UnboundedReceiver<Mail>,
}

impl Harness {
    pub async fn new() -> Self {
        let store: SharedStore = Arc::new(MemoryStore::new());
        catalog::seed_permissions(&store).await.unwrap();
        for id in ["content:read", "content:write"] {
            store
                .upsert_permission(&Permission::new(id, None))
                .await
                .unwrap();
        }

        let (tx, outbox) = mpsc::unbounded_channel();
        let core = AdminCore::new(store, Arc::new(ChannelMailer(tx)), Settings::default());
        Self { core, outbox }
    }

    pub async fn user(&self, email: &str) -> User {
        self.core
            .users
            .register(
                NewUser {
                    email: email.to_string(),
                    name: None,
                    first_name: None,
                    last_name: None,
                    password: PASSWORD.to_string(),
                },
                None,
            )
            .await
            .unwrap()
    }

    pub async fn role(&self, name: &str, permissions: &[&str]) -> Role {
        let role = self
            .core
            .roles
            .create_role(
                NewRole {
                    name: name.to_string(),
                    description: None,
                },
                None,
            )
            .await
            .unwrap();
        let ids: Vec<String> = permissions.iter().map(|p| p.to_string()).collect();
        self.core
            .roles
            .set_role_permissions(role.id, &ids, None)
            .await
            .unwrap();
        role
    }

    /// Next message addressed to `to`, skipping unrelated mail
    pub async fn mail_to(&mut self, to: &str) -> Mail {
        loop {
            let mail = tokio::time::timeout(Duration::from_secs(5), self.outbox.recv())
                .await
                .expect("mail within timeout")
                .expect("outbox open");
            if mail.to == to && !mail.subject.starts_with("Welcome") {
                return mail;
            }
        }
    }
}

pub fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
