//! Fixed avatar identities and their voice configuration

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Source image for the female presenter
pub const SOFIA_IMAGE_URL: &str = "https://create-images-results.d-id.com/google-oauth2%7C113228135334831093217/upl_EEY93HJXprfY-QhMSFjcv/image.png";

/// Source image for the male presenter
pub const JACK_IMAGE_URL: &str = "https://create-images-results.d-id.com/google-oauth2%7C113228135334831093217/upl_re6eFAc5DzF8ooqhvqDyg/image.png";

/// Neural voice used by Sofia
pub const SOFIA_VOICE_ID: &str = "en-US-JennyNeural";

/// Neural voice used by Jack
pub const JACK_VOICE_ID: &str = "en-US-GuyNeural";

/// Speaking style shared by both presenters
pub const NEWSCAST_STYLE: &str = "Newscast";

/// Text-to-speech vendor understood by the provider
pub const VOICE_PROVIDER: &str = "microsoft";

/// Presenter identity attached to each article
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Avatar {
    /// Identity A
    Sofia,
    /// Identity B, also the fallback for unknown selectors
    #[default]
    Jack,
}

impl Avatar {
    /// Map an article's selector to an identity
    ///
    /// Accepts the stored names (`"Sofia"`, `"Jack"`) and the short forms
    /// (`"A"`, `"B"`), case-insensitively. Anything else is `Jack`.
    pub fn from_selector(selector: &str) -> Self {
        match selector.trim().to_ascii_lowercase().as_str() {
            "sofia" | "a" => Avatar::Sofia,
            _ => Avatar::Jack,
        }
    }

    /// Stored name of this identity
    pub fn name(&self) -> &'static str {
        match self {
            Avatar::Sofia => "Sofia",
            Avatar::Jack => "Jack",
        }
    }

    /// Source image and voice for this identity
    pub fn profile(&self) -> AvatarProfile {
        match self {
            Avatar::Sofia => AvatarProfile {
                avatar: *self,
                source_url: SOFIA_IMAGE_URL,
                voice: VoiceConfig::newscast(SOFIA_VOICE_ID),
            },
            Avatar::Jack => AvatarProfile {
                avatar: *self,
                source_url: JACK_IMAGE_URL,
                voice: VoiceConfig::newscast(JACK_VOICE_ID),
            },
        }
    }
}

impl fmt::Display for Avatar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Avatar {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Avatar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let selector = Option::<String>::deserialize(deserializer)?;
        Ok(selector
            .map(|s| Avatar::from_selector(&s))
            .unwrap_or_default())
    }
}

/// Voice settings sent with a start-speech request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// TTS vendor
    pub provider: String,
    /// Neural voice ID
    pub voice_id: String,
    /// Speaking style
    pub style: String,
}

impl VoiceConfig {
    /// Microsoft neural voice with the newscast style
    pub fn newscast(voice_id: &str) -> Self {
        Self {
            provider: VOICE_PROVIDER.to_string(),
            voice_id: voice_id.to_string(),
            style: NEWSCAST_STYLE.to_string(),
        }
    }
}

/// Everything the session needs to know about one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarProfile {
    /// Identity
    pub avatar: Avatar,
    /// Image the provider animates
    pub source_url: &'static str,
    /// Voice used for speech
    pub voice: VoiceConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_a_maps_to_sofia() {
        let profile = Avatar::from_selector("A").profile();
        assert_eq!(profile.avatar, Avatar::Sofia);
        assert_eq!(profile.source_url, SOFIA_IMAGE_URL);
        assert_eq!(profile.voice.voice_id, "en-US-JennyNeural");
        assert_eq!(profile.voice.style, "Newscast");
    }

    #[test]
    fn test_identity_b_maps_to_jack() {
        let profile = Avatar::from_selector("B").profile();
        assert_eq!(profile.avatar, Avatar::Jack);
        assert_eq!(profile.source_url, JACK_IMAGE_URL);
        assert_eq!(profile.voice.voice_id, "en-US-GuyNeural");
    }

    #[test]
    fn test_stored_names_are_accepted() {
        assert_eq!(Avatar::from_selector("Sofia"), Avatar::Sofia);
        assert_eq!(Avatar::from_selector("Jack"), Avatar::Jack);
        assert_eq!(Avatar::from_selector(" sofia "), Avatar::Sofia);
    }

    #[test]
    fn test_unknown_selector_falls_back_deterministically() {
        for selector in ["", "C", "sofía", "Jill", "null"] {
            assert_eq!(Avatar::from_selector(selector), Avatar::Jack);
            assert_eq!(
                Avatar::from_selector(selector).profile(),
                Avatar::Jack.profile()
            );
        }
    }

    #[test]
    fn test_profiles_are_distinct() {
        let sofia = Avatar::Sofia.profile();
        let jack = Avatar::Jack.profile();
        assert_ne!(sofia.source_url, jack.source_url);
        assert_ne!(sofia.voice.voice_id, jack.voice.voice_id);
        assert_eq!(sofia.voice.provider, jack.voice.provider);
    }

    #[test]
    fn test_deserialize_missing_selector() {
        let avatar: Avatar = serde_json::from_str("null").unwrap();
        assert_eq!(avatar, Avatar::Jack);
        let avatar: Avatar = serde_json::from_str(r#""Sofia""#).unwrap();
        assert_eq!(avatar, Avatar::Sofia);
    }
}
