use serde::Deserialize;

/// The part of an upstream event the digester cares about.
///
/// Everything but the actor is ignored. A record without an actor still
/// counts as an event; it just contributes no username.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRecord {
    #[serde(default)]
    pub actor: Option<ActorRecord>,
}

/// Actor block nested in an [`EventRecord`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActorRecord {
    #[serde(default, rename = "login")]
    pub username: Option<String>,
}

impl EventRecord {
    /// Raw actor login, if the record carries one.
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.actor.as_ref()?.username.as_deref()
    }
}
