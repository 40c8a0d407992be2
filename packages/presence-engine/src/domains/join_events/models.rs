use serde::{Deserialize, Serialize};

/// A made-up person who can "join" a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinIdentity {
    pub name: String,
    pub age: u8,
    pub role: String,
}

impl JoinIdentity {
    pub fn new(name: impl Into<String>, age: u8, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            role: role.into(),
        }
    }

    /// Display username, e.g. `jordan24`.
    pub fn username(&self) -> String {
        format!("{}{}", self.name.to_lowercase(), self.age)
    }
}

/// Payload handed to the notification callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinNotification {
    pub username: String,
    pub role: String,
}

impl From<&JoinIdentity> for JoinNotification {
    fn from(identity: &JoinIdentity) -> Self {
        Self {
            username: identity.username(),
            role: identity.role.clone(),
        }
    }
}

/// Built-in identities used when no pool is supplied.
pub fn default_identity_pool() -> Vec<JoinIdentity> {
    [
        ("Jordan", 24, "member"),
        ("Priya", 31, "member"),
        ("Sam", 19, "newcomer"),
        ("Alex", 27, "member"),
        ("Maria", 35, "volunteer"),
        ("Deshawn", 22, "newcomer"),
        ("Lena", 29, "member"),
        ("Omar", 41, "volunteer"),
        ("Kenji", 26, "member"),
        ("Grace", 33, "newcomer"),
        ("Tomas", 38, "member"),
        ("Aisha", 21, "newcomer"),
    ]
    .into_iter()
    .map(|(name, age, role)| JoinIdentity::new(name, age, role))
    .collect()
}
