//! Language-option vocabulary
//!
//! Maps the free-text labels of the player's language menu to variant tags and
//! the locale the player expects in its language parameter.

use crate::catalog::VariantTag;

/// A recognized language option
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Language {
    /// Tag the variant is stored under
    pub tag: VariantTag,
    /// Locale passed to the player (e.g. "ja-JP")
    pub locale: &'static str,
}

struct Entry {
    code: &'static str,
    locale: &'static str,
    needles: &'static [&'static str],
}

// Checked in order; the first entry with a matching needle wins.
const ENTRIES: &[Entry] = &[
    Entry {
        code: "SUB",
        locale: "ja-JP",
        needles: &["japanese", "sub"],
    },
    Entry {
        code: "DUB",
        locale: "en-US",
        needles: &["english", "dub"],
    },
    Entry {
        code: "ES",
        locale: "es-ES",
        needles: &["spanish", "español", "espanol"],
    },
    Entry {
        code: "PT",
        locale: "pt-BR",
        needles: &["portuguese", "português", "portugues"],
    },
    Entry {
        code: "FR",
        locale: "fr-FR",
        needles: &["french", "français", "francais"],
    },
    Entry {
        code: "DE",
        locale: "de-DE",
        needles: &["german", "deutsch"],
    },
    Entry {
        code: "IT",
        locale: "it-IT",
        needles: &["italian", "italiano"],
    },
    Entry {
        code: "AR",
        locale: "ar-SA",
        needles: &["arabic"],
    },
    Entry {
        code: "RU",
        locale: "ru-RU",
        needles: &["russian"],
    },
    Entry {
        code: "ID",
        locale: "id-ID",
        needles: &["indonesian", "bahasa"],
    },
    Entry {
        code: "ZH",
        locale: "zh-CN",
        needles: &["chinese", "mandarin"],
    },
    Entry {
        code: "KO",
        locale: "ko-KR",
        needles: &["korean"],
    },
];

/// Recognize a language-menu label by case-insensitive substring
pub fn recognize(label: &str) -> Option<Language> {
    let label = label.to_lowercase();
    ENTRIES
        .iter()
        .find(|entry| entry.needles.iter().any(|needle| label.contains(needle)))
        .map(|entry| Language {
            tag: entry.code.parse().unwrap_or(VariantTag::Raw),
            locale: entry.locale,
        })
}
