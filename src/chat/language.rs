//! Supported reply languages and the fixed texts keyed by them.
//!
//! A `Language` can only come from [`SUPPORTED_LANGUAGES`], so holding one
//! proves the code is supported.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LanguageError {
    #[error("unsupported language code: {0:?}")]
    Unsupported(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Language {
    code: &'static str,
    name: &'static str,
    native_name: &'static str,
}

const fn lang(code: &'static str, name: &'static str, native_name: &'static str) -> Language {
    Language { code, name, native_name }
}

/// Selectable languages, in menu order. The first entry is the default.
pub const SUPPORTED_LANGUAGES: [Language; 10] = [
    lang("en", "English", "English"),
    lang("hi", "Hindi", "हिन्दी"),
    lang("bn", "Bengali", "বাংলা"),
    lang("te", "Telugu", "తెలుగు"),
    lang("mr", "Marathi", "मराठी"),
    lang("ta", "Tamil", "தமிழ்"),
    lang("ur", "Urdu", "اردو"),
    lang("gu", "Gujarati", "ગુજરાતી"),
    lang("kn", "Kannada", "ಕನ್ನಡ"),
    lang("pa", "Punjabi", "ਪੰਜਾਬੀ"),
];

pub const WELCOME_EN: &str = "Hello! I'm your AgriWise assistant. How can I help you today with farming advice?";
pub const WELCOME_HI: &str = "नमस्ते! मैं आपका एग्रीवाइज़ सहायक हूँ। आज मैं आपकी कृषि सलाह के साथ कैसे मदद कर सकता हूँ?";

/// Canned "now speaking your language" replies. Codes without an entry fall
/// back to English.
const CANNED_REPLIES: [(&str, &str); 4] = [
    (
        "en",
        "Thank you for your question. I'll help you with farming advice. Please provide more details about your specific farming needs.",
    ),
    (
        "hi",
        "आपके प्रश्न के लिए धन्यवाद। मैं आपको खेती की सलाह के साथ मदद करूंगा। कृपया अपनी विशिष्ट खेती की जरूरतों के बारे में अधिक विवरण प्रदान करें।",
    ),
    (
        "bn",
        "আপনার প্রশ্নের জন্য ধন্যবাদ। আমি আপনাকে কৃষি পরামর্শ দিয়ে সাহায্য করব। দয়া করে আপনার নির্দিষ্ট কৃষি প্রয়োজনের বিষয়ে আরও বিবরণ দিন।",
    ),
    (
        "te",
        "మీ ప్రశ్నకు ధన్యవాదాలు. నేను మీకు వ్యవసాయ సలహాతో సహాయపడతాను. దయచేసి మీ నిర్దిష్ట వ్యవసాయ అవసరాల గురించి మరిన్ని వివరాలను అందించండి.",
    ),
];

impl Language {
    /// Look up a supported language by its code.
    ///
    /// # Errors
    ///
    /// Returns [`LanguageError::Unsupported`] for any code outside
    /// [`SUPPORTED_LANGUAGES`].
    pub fn from_code(code: &str) -> Result<Self, LanguageError> {
        SUPPORTED_LANGUAGES
            .iter()
            .copied()
            .find(|l| l.code == code)
            .ok_or_else(|| LanguageError::Unsupported(code.to_string()))
    }

    #[must_use]
    pub fn code(self) -> &'static str {
        self.code
    }

    /// English display name, used inside assistant prompts.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn native_name(self) -> &'static str {
        self.native_name
    }

    #[must_use]
    pub fn is_english(self) -> bool {
        self.code == "en"
    }

    /// Greeting for a fresh transcript. Every non-English language gets the
    /// Hindi greeting.
    #[must_use]
    pub fn welcome_message(self) -> &'static str {
        if self.is_english() { WELCOME_EN } else { WELCOME_HI }
    }

    #[must_use]
    pub fn canned_reply(self) -> &'static str {
        CANNED_REPLIES
            .iter()
            .find(|(code, _)| *code == self.code)
            .or_else(|| CANNED_REPLIES.first())
            .map_or("", |(_, text)| *text)
    }

    #[must_use]
    pub fn input_placeholder(self) -> &'static str {
        if self.is_english() { "Type your question..." } else { "अपना प्रश्न लिखें..." }
    }

    #[must_use]
    pub fn expert_button_label(self) -> &'static str {
        if self.is_english() {
            "Connect with Expert or Watch Tutorials"
        } else {
            "विशेषज्ञ से जुड़ें या ट्यूटोरियल देखें"
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        SUPPORTED_LANGUAGES[0]
    }
}

/// Persisted shape of a language selection. Only `code` is trusted on load;
/// `name` and `nativeName` are re-derived from the supported table.
#[derive(Debug, Deserialize)]
pub(crate) struct StoredLanguage {
    pub(crate) code: String,
}

#[cfg(test)]
#[path = "language_test.rs"]
mod tests;
