//! Identifier mangling and the randomness behind generated names.

use nanoid::nanoid;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ID_ALPHABET: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I',
    'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b',
    'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u',
    'v', 'w', 'x', 'y', 'z',
];

const FILE_ID_LEN: usize = 10;

/// Exclusive upper bound of the numeric identifier suffix.
pub const SUFFIX_RANGE: u16 = 1000;

/// Source of identifier suffixes and data file ids.
///
/// `Seeded` makes a whole generation reproducible. `Fixed` always yields
/// the same suffix and counts file ids up from zero.
#[derive(Debug, Default)]
pub enum Entropy {
    #[default]
    Os,
    Seeded(StdRng),
    Fixed { suffix: u16, next_file: u64 },
}

impl Entropy {
    pub fn seeded(seed: u64) -> Self {
        Entropy::Seeded(StdRng::seed_from_u64(seed))
    }

    pub fn fixed(suffix: u16) -> Self {
        Entropy::Fixed {
            suffix: suffix % SUFFIX_RANGE,
            next_file: 0,
        }
    }

    /// Random suffix in `0..SUFFIX_RANGE`.
    pub fn suffix(&mut self) -> u16 {
        match self {
            Entropy::Os => rand::thread_rng().gen_range(0..SUFFIX_RANGE),
            Entropy::Seeded(rng) => rng.gen_range(0..SUFFIX_RANGE),
            Entropy::Fixed { suffix, .. } => *suffix,
        }
    }

    /// Short alphanumeric id for generated file names.
    pub fn file_id(&mut self) -> String {
        match self {
            Entropy::Os => nanoid!(FILE_ID_LEN, &ID_ALPHABET),
            Entropy::Seeded(rng) => (0..FILE_ID_LEN)
                .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())])
                .collect(),
            Entropy::Fixed { next_file, .. } => {
                let id = format!("{:0width$}", *next_file, width = FILE_ID_LEN);
                *next_file += 1;
                id
            }
        }
    }
}

/// Reduce a display name to lowercase ASCII alphanumerics, usable as a
/// config identifier. Names that end up empty or digit-led get a `w` prefix.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    match cleaned.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => cleaned,
        _ => format!("w{cleaned}"),
    }
}

pub fn mangle(name: &str, suffix: u16) -> String {
    format!("{}{suffix}", sanitize(name))
}

/// File-name-safe form of a binding name.
pub(crate) fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if stem.is_empty() { "binding".to_string() } else { stem }
}
