use carebell_services::{NotificationBackend, auth::UserRole};

use super::test_app::TestApp;

pub struct SeededUser {
    pub id: String,
    pub access_token: String,
}

/// A user with an inbox of notifications.
pub struct SeededInbox {
    pub user: SeededUser,
    pub unread: Vec<String>,
    pub read: Vec<String>,
}

impl TestApp {
    pub fn seed_user(&self, prefix: &str, role: UserRole) -> SeededUser {
        let id = format!("{}-{}", prefix, uuid::Uuid::new_v4().simple());
        let access_token = self.token_for(&id, role);
        SeededUser { id, access_token }
    }

    /// Seeds a patient with `unread` unread and `read` read notifications.
    pub async fn seed_inbox(&self, prefix: &str, unread: usize, read: usize) -> SeededInbox {
        let user = self.seed_user(prefix, UserRole::Patient);

        let unread_ids = (0..unread)
            .map(|i| {
                self.backend
                    .create(&user.id, Some("Dr. Mensah"), &format!("Reminder {i}"))
            })
            .collect();

        let mut read_ids = Vec::with_capacity(read);
        for i in 0..read {
            let id = self
                .backend
                .create(&user.id, Some("Front desk"), &format!("Notice {i}"));
            self.backend
                .mark_read(&id)
                .await
                .expect("Failed to seed read notification");
            read_ids.push(id);
        }

        SeededInbox {
            user,
            unread: unread_ids,
            read: read_ids,
        }
    }
}
