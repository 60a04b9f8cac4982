use lazy_static::lazy_static;
use rand::{seq::SliceRandom, Rng};
use regex::Regex;
use serde::Deserialize;

use crate::users::error::PasswordPolicyViolation;

/// Password strength rules. Lengths are counted in characters.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub max_length: usize,
    /// Characters that count as "special". `None` means any ASCII punctuation.
    pub special_chars: Option<String>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            special_chars: None,
        }
    }
}

/// A password that passed a `PasswordPolicy`. Only this type can be hashed.
#[derive(Clone, Copy)]
pub struct StrongPassword<'a>(&'a str);

impl<'a> StrongPassword<'a> {
    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

impl std::fmt::Debug for StrongPassword<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StrongPassword(..)")
    }
}

impl PasswordPolicy {
    fn is_special(&self, c: char) -> bool {
        match &self.special_chars {
            Some(set) => set.contains(c),
            None => c.is_ascii_punctuation(),
        }
    }

    /// Checks the rules in order and reports the first one broken.
    pub fn accept<'a>(&self, candidate: &'a str) -> Result<StrongPassword<'a>, PasswordPolicyViolation> {
        let len = candidate.chars().count();
        if len < self.min_length {
            return Err(PasswordPolicyViolation::TooShort { min: self.min_length });
        }
        if len > self.max_length {
            return Err(PasswordPolicyViolation::TooLong { max: self.max_length });
        }
        if !candidate.chars().any(char::is_uppercase) {
            return Err(PasswordPolicyViolation::MissingUppercase);
        }
        if !candidate.chars().any(char::is_lowercase) {
            return Err(PasswordPolicyViolation::MissingLowercase);
        }
        if !candidate.chars().any(|c| c.is_ascii_digit()) {
            return Err(PasswordPolicyViolation::MissingDigit);
        }
        if !candidate.chars().any(|c| self.is_special(c)) {
            return Err(PasswordPolicyViolation::MissingSpecial);
        }
        Ok(StrongPassword(candidate))
    }

    pub fn validate_password(&self, candidate: &str) -> Result<(), PasswordPolicyViolation> {
        self.accept(candidate).map(|_| ())
    }
}

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref NICKNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{3,32}$").unwrap();
    static ref URL_RE: Regex = Regex::new(r"^https?://[^\s/$.?#][^\s]*$").unwrap();
}

/// Column widths of `users.*_url` and `users.{first,last}_name`.
pub const MAX_URL_CHARS: usize = 255;
pub const MAX_NAME_CHARS: usize = 100;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 255 && EMAIL_RE.is_match(email)
}

pub fn is_valid_nickname(nickname: &str) -> bool {
    NICKNAME_RE.is_match(nickname)
}

pub fn is_valid_url(url: &str) -> bool {
    url.chars().count() <= MAX_URL_CHARS && URL_RE.is_match(url)
}

pub fn is_valid_name(name: &str) -> bool {
    name.chars().count() <= MAX_NAME_CHARS
}

const ADJECTIVES: &[&str] = &[
    "clever", "jolly", "brave", "sly", "gentle", "swift", "quiet", "bold", "lucky", "wise",
];
const ANIMALS: &[&str] = &[
    "panda", "fox", "raccoon", "koala", "lion", "otter", "heron", "lynx", "badger", "owl",
];

/// Random nickname such as `clever_fox_412` for users who did not pick one.
pub fn generate_nickname() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES.choose(&mut rng).copied().unwrap_or("quiet");
    let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("owl");
    let number: u16 = rng.gen_range(0..1000);
    format!("{}_{}_{}", adjective, animal, number)
}
