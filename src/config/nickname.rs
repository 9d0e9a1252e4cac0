//! Default nickname for servers configured without one.
//!
//! Nicknames look like `AdjectiveNounNN` (e.g. `TidalCrab42`) and stay short
//! enough for servers with a small NICKLEN.

use rand::RngExt;

const ADJECTIVES: &[&str] = &[
    "Rusty", "Brisk", "Salty", "Quiet", "Amber", "Tidal", "Coral", "Sandy", "Misty", "Swift",
    "Mossy", "Sunny", "Lucky", "Drift", "Shell", "Pearl", "Kelp", "Briny",
];

const NOUNS: &[&str] = &[
    "Crab", "Claw", "Tide", "Reef", "Gull", "Eel", "Squid", "Prawn", "Clam", "Wave", "Pier",
    "Buoy", "Skiff", "Kraken", "Otter", "Shoal",
];

/// Generate a random nickname like `TidalCrab42`.
pub fn generate_nickname() -> String {
    let mut rng = rand::rng();
    let adj = ADJECTIVES[rng.random_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.random_range(0..NOUNS.len())];
    let num: u8 = rng.random_range(0..100);
    format!("{}{}{}", adj, noun, num)
}
