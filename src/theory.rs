//! Harmonic mixing theory: the Camelot wheel and compatibility scoring
//!
//! The Camelot wheel organizes the 24 musical keys in a circle for harmonic
//! mixing. The outer ring (B) holds the major keys, the inner ring (A) the
//! minors; adjacent positions are harmonically compatible.
//!
//! This module scores harmonic, tempo, and energy compatibility between two
//! tracks. The harmonic table and the BPM ladder drive the transition
//! planner's choice of mode and duration.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::error::SegueError;

/// Ring of the Camelot wheel: A = minor (inner), B = major (outer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Minor,
    Major,
}

impl Mode {
    pub fn letter(self) -> char {
        match self {
            Mode::Minor => 'A',
            Mode::Major => 'B',
        }
    }

    pub fn other(self) -> Mode {
        match self {
            Mode::Minor => Mode::Major,
            Mode::Major => Mode::Minor,
        }
    }
}

/// One of the 24 positions on the Camelot wheel, e.g. `8A` (A minor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CamelotKey {
    number: u8, // 1..=12
    mode: Mode,
}

lazy_static! {
    /// Camelot code -> musical key name (plus enharmonic spelling when common)
    static ref WHEEL: HashMap<&'static str, (&'static str, Option<&'static str>)> = {
        let mut m = HashMap::new();
        // Minor keys (A) - inner ring
        m.insert("1A", ("Abm", Some("G#m")));
        m.insert("2A", ("Ebm", Some("D#m")));
        m.insert("3A", ("Bbm", Some("A#m")));
        m.insert("4A", ("Fm", None));
        m.insert("5A", ("Cm", None));
        m.insert("6A", ("Gm", None));
        m.insert("7A", ("Dm", None));
        m.insert("8A", ("Am", None));
        m.insert("9A", ("Em", None));
        m.insert("10A", ("Bm", None));
        m.insert("11A", ("F#m", Some("Gbm")));
        m.insert("12A", ("C#m", Some("Dbm")));
        // Major keys (B) - outer ring
        m.insert("1B", ("B", Some("Cb")));
        m.insert("2B", ("F#", Some("Gb")));
        m.insert("3B", ("Db", Some("C#")));
        m.insert("4B", ("Ab", Some("G#")));
        m.insert("5B", ("Eb", Some("D#")));
        m.insert("6B", ("Bb", Some("A#")));
        m.insert("7B", ("F", None));
        m.insert("8B", ("C", None));
        m.insert("9B", ("G", None));
        m.insert("10B", ("D", None));
        m.insert("11B", ("A", None));
        m.insert("12B", ("E", None));
        m
    };

    /// Lowercased musical key alias -> Camelot code
    static ref KEY_TO_CAMELOT: HashMap<String, &'static str> = {
        let mut m: HashMap<String, &'static str> = HashMap::new();
        for (&code, &(name, enharmonic)) in WHEEL.iter() {
            m.insert(name.to_lowercase(), code);
            if let Some(enh) = enharmonic {
                m.insert(enh.to_lowercase(), code);
            }
            // Long-form aliases: "a minor", "c major", "f# major"
            let (root, quality) = if let Some(stripped) = name.strip_suffix('m') {
                (stripped.to_string(), "minor")
            } else {
                (name.to_string(), "major")
            };
            m.insert(format!("{} {}", root.to_lowercase(), quality), code);
            if let Some(enh) = enharmonic {
                let root = enh.strip_suffix('m').unwrap_or(enh);
                m.insert(
                    format!("{} {}", root.to_lowercase(), quality),
                    code,
                );
            }
        }
        m
    };
}

impl CamelotKey {
    /// Build a key from a wheel position and ring
    ///
    /// Returns None when the number is outside 1..=12.
    pub fn new(number: u8, mode: Mode) -> Option<Self> {
        if (1..=12).contains(&number) {
            Some(Self { number, mode })
        } else {
            None
        }
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The musical key name for this position, e.g. "Am" for 8A
    pub fn musical_key(&self) -> &'static str {
        WHEEL[self.to_string().as_str()].0
    }

    /// The relative major/minor: same number, other ring
    pub fn relative(&self) -> CamelotKey {
        CamelotKey {
            number: self.number,
            mode: self.mode.other(),
        }
    }

    /// Neighbour at +steps around the wheel (same ring)
    pub fn step(&self, steps: i8) -> CamelotKey {
        let shifted = (self.number as i16 - 1 + steps as i16).rem_euclid(12) as u8 + 1;
        CamelotKey {
            number: shifted,
            mode: self.mode,
        }
    }

    /// Circular distance between two wheel positions (0..=6)
    pub fn distance(&self, other: &CamelotKey) -> u8 {
        let raw = (self.number as i16 - other.number as i16).unsigned_abs() as u8;
        raw.min(12 - raw)
    }

    /// Harmonically compatible keys for mixing, best first
    ///
    /// Same key (100), both adjacents (95), the relative (90), and the two
    /// diagonals (80).
    pub fn compatible_keys(&self) -> Vec<(CamelotKey, u8)> {
        vec![
            (*self, 100),
            (self.step(1), 95),
            (self.step(-1), 95),
            (self.relative(), 90),
            (self.step(1).relative(), 80),
            (self.step(-1).relative(), 80),
        ]
    }
}

impl fmt::Display for CamelotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.number, self.mode.letter())
    }
}

impl FromStr for CamelotKey {
    type Err = SegueError;

    /// Parse a Camelot code or a musical-key alias
    ///
    /// Accepts "8A", "8a", "Am", "a minor", "G#m", "c major", etc.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(SegueError::Other("empty key".to_string()));
        }

        // Camelot form: digits followed by A/B
        let upper = trimmed.to_uppercase();
        if let Some(mode) = match upper.chars().last() {
            Some('A') => Some(Mode::Minor),
            Some('B') => Some(Mode::Major),
            _ => None,
        } {
            if let Ok(number) = upper[..upper.len() - 1].parse::<u8>() {
                if let Some(key) = CamelotKey::new(number, mode) {
                    return Ok(key);
                }
            }
        }

        // Musical key alias
        let lower = trimmed.to_lowercase();
        if let Some(&code) = KEY_TO_CAMELOT.get(lower.as_str()) {
            return code.parse();
        }

        Err(SegueError::Other(format!("unrecognized key: {}", s)))
    }
}

/// Relationship classification backing a harmonic score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HarmonicRelation {
    Perfect,
    Adjacent,
    Relative,
    Diagonal,
    EnergyShift,
    Subdominant,
    DistantDiagonal,
    Distant,
    Incompatible,
    Unknown,
}

/// Score the harmonic compatibility of two keys (0-100)
///
/// The cases are evaluated in order; the first match wins. `d` is circular
/// distance, so it never exceeds 6: the dominant (+7) and subdominant (+5)
/// movements both land at distance 5 and score the same, which keeps the
/// function symmetric.
///
/// | Relation                  | Score |
/// |---------------------------|-------|
/// | same key                  | 100   |
/// | ±1 same ring              | 95    |
/// | relative major/minor      | 90    |
/// | ±1 other ring (diagonal)  | 80    |
/// | ±2 same ring              | 70    |
/// | ±5 same ring (dom/subdom) | 70    |
/// | ±2 other ring             | 60    |
/// | ±3 same ring              | 50    |
/// | anything else             | 30    |
pub fn harmonic_score(key_a: &CamelotKey, key_b: &CamelotKey) -> (u8, HarmonicRelation) {
    let d = key_a.distance(key_b);
    let same_mode = key_a.mode == key_b.mode;

    if key_a == key_b {
        (100, HarmonicRelation::Perfect)
    } else if d == 1 && same_mode {
        (95, HarmonicRelation::Adjacent)
    } else if d == 0 && !same_mode {
        (90, HarmonicRelation::Relative)
    } else if d == 1 && !same_mode {
        (80, HarmonicRelation::Diagonal)
    } else if d == 5 && same_mode {
        (70, HarmonicRelation::Subdominant)
    } else if d == 2 && same_mode {
        (70, HarmonicRelation::EnergyShift)
    } else if d == 2 && !same_mode {
        (60, HarmonicRelation::DistantDiagonal)
    } else if d == 3 && same_mode {
        (50, HarmonicRelation::Distant)
    } else {
        (30, HarmonicRelation::Incompatible)
    }
}

/// Score harmonic compatibility from raw key strings
///
/// Unknown or unparseable keys score a neutral 50.
pub fn harmonic_score_str(key_a: &str, key_b: &str) -> (u8, HarmonicRelation) {
    match (CamelotKey::from_str(key_a), CamelotKey::from_str(key_b)) {
        (Ok(a), Ok(b)) => harmonic_score(&a, &b),
        _ => (50, HarmonicRelation::Unknown),
    }
}

/// Whether a long blend is safe between two keys (score >= 70)
pub fn is_blend_safe(key_a: &CamelotKey, key_b: &CamelotKey) -> bool {
    harmonic_score(key_a, key_b).0 >= 70
}

/// Whether a hard cut is required (score < 50)
pub fn requires_hard_cut(key_a: &CamelotKey, key_b: &CamelotKey) -> bool {
    harmonic_score(key_a, key_b).0 < 50
}

/// Tempo relationship chosen by the BPM scorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TempoFactor {
    #[default]
    Normal,
    HalfTime,
    DoubleTime,
}

/// Result of BPM compatibility scoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BpmScore {
    pub score: u8,
    /// Effective BPM of track B after any factor-of-two adjustment
    pub effective_bpm_b: f32,
    pub factor: TempoFactor,
    /// Percentage difference used for the score
    pub delta_percent: f32,
}

fn bpm_ladder(delta_percent: f32) -> u8 {
    if delta_percent <= 2.0 {
        100
    } else if delta_percent <= 4.0 {
        85
    } else if delta_percent <= 6.0 {
        70
    } else if delta_percent <= 8.0 {
        55
    } else {
        25
    }
}

/// Score tempo compatibility of two BPMs (0-100)
///
/// Checks half-time and double-time equivalents of track B; if either gives a
/// strictly better score it is used and the caller is signalled to apply the
/// factor-of-two adjustment.
pub fn bpm_score(bpm_a: f32, bpm_b: f32) -> BpmScore {
    let delta = |b: f32| (bpm_a - b).abs() / bpm_a * 100.0;

    let candidates = [
        (bpm_b, TempoFactor::Normal),
        (bpm_b * 2.0, TempoFactor::DoubleTime),
        (bpm_b / 2.0, TempoFactor::HalfTime),
    ];

    let mut best = BpmScore {
        score: bpm_ladder(delta(bpm_b)),
        effective_bpm_b: bpm_b,
        factor: TempoFactor::Normal,
        delta_percent: delta(bpm_b),
    };

    for &(candidate, factor) in &candidates[1..] {
        let d = delta(candidate);
        let score = bpm_ladder(d);
        if score > best.score {
            best = BpmScore {
                score,
                effective_bpm_b: candidate,
                factor,
                delta_percent: d,
            };
        }
    }

    best
}

/// Score energy proximity of two tracks (0-100)
pub fn energy_score(energy_a: f32, energy_b: f32) -> u8 {
    let proximity = 1.0 - (energy_a - energy_b).abs().clamp(0.0, 1.0);
    (proximity * 100.0).round() as u8
}

/// Combined compatibility of an adjacent track pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Compatibility {
    pub harmonic: u8,
    pub bpm: u8,
    pub energy: u8,
    pub overall: u8,
    pub relation: HarmonicRelation,
    pub tempo_factor: TempoFactor,
    pub bpm_delta_percent: f32,
}

impl Compatibility {
    /// Score a pair from raw attributes
    ///
    /// Overall = 0.5 * harmonic + 0.3 * bpm + 0.2 * energy.
    pub fn score(
        key_a: Option<&str>,
        key_b: Option<&str>,
        bpm_a: f32,
        bpm_b: f32,
        energy_a: f32,
        energy_b: f32,
    ) -> Self {
        let (harmonic, relation) = match (key_a, key_b) {
            (Some(a), Some(b)) => harmonic_score_str(a, b),
            _ => (50, HarmonicRelation::Unknown),
        };
        let bpm = bpm_score(bpm_a, bpm_b);
        let energy = energy_score(energy_a, energy_b);

        let overall = (0.5 * harmonic as f32 + 0.3 * bpm.score as f32 + 0.2 * energy as f32)
            .round() as u8;

        Self {
            harmonic,
            bpm: bpm.score,
            energy,
            overall,
            relation,
            tempo_factor: bpm.factor,
            bpm_delta_percent: bpm.delta_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> CamelotKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_camelot_codes() {
        assert_eq!(key("8A").to_string(), "8A");
        assert_eq!(key("12b").to_string(), "12B");
        assert!("0A".parse::<CamelotKey>().is_err());
        assert!("13B".parse::<CamelotKey>().is_err());
        assert!("8C".parse::<CamelotKey>().is_err());
    }

    #[test]
    fn test_parse_musical_aliases() {
        assert_eq!(key("Am").to_string(), "8A");
        assert_eq!(key("C"), key("8B"));
        assert_eq!(key("a minor"), key("8A"));
        assert_eq!(key("c major"), key("8B"));
        assert_eq!(key("G#m"), key("1A"));
        assert_eq!(key("gb major"), key("2B"));
    }

    #[test]
    fn test_camelot_round_trip() {
        // camelot(key_to_camelot(key)) = key for every Camelot code
        for n in 1..=12u8 {
            for mode in [Mode::Minor, Mode::Major] {
                let k = CamelotKey::new(n, mode).unwrap();
                let musical = k.musical_key();
                assert_eq!(key(musical), k, "round-trip failed for {}", k);
            }
        }
    }

    #[test]
    fn test_harmonic_table() {
        assert_eq!(harmonic_score(&key("8A"), &key("8A")).0, 100);
        assert_eq!(harmonic_score(&key("8A"), &key("9A")).0, 95);
        assert_eq!(harmonic_score(&key("8A"), &key("7A")).0, 95);
        assert_eq!(harmonic_score(&key("8A"), &key("8B")).0, 90);
        assert_eq!(harmonic_score(&key("8A"), &key("9B")).0, 80);
        assert_eq!(harmonic_score(&key("8A"), &key("3A")).0, 70); // dominant movement (+7)
        assert_eq!(harmonic_score(&key("8A"), &key("10A")).0, 70); // energy shift
        assert_eq!(harmonic_score(&key("8A"), &key("1A")).0, 70); // subdominant (+5)
        assert_eq!(harmonic_score(&key("8A"), &key("10B")).0, 60);
        assert_eq!(harmonic_score(&key("8A"), &key("11A")).0, 50);
        assert_eq!(harmonic_score(&key("8A"), &key("2B")).0, 30);
    }

    #[test]
    fn test_harmonic_score_is_symmetric() {
        // harmonic_score(a, b) = harmonic_score(b, a) for every pair
        for na in 1..=12u8 {
            for nb in 1..=12u8 {
                for (ma, mb) in [
                    (Mode::Minor, Mode::Minor),
                    (Mode::Minor, Mode::Major),
                    (Mode::Major, Mode::Major),
                ] {
                    let a = CamelotKey::new(na, ma).unwrap();
                    let b = CamelotKey::new(nb, mb).unwrap();
                    assert_eq!(
                        harmonic_score(&a, &b).0,
                        harmonic_score(&b, &a).0,
                        "{} vs {}",
                        a,
                        b
                    );
                }
            }
        }
    }

    #[test]
    fn test_wheel_wraparound() {
        // 12A and 1A are neighbours on the circle
        assert_eq!(harmonic_score(&key("12A"), &key("1A")).0, 95);
        assert_eq!(harmonic_score(&key("1B"), &key("12B")).0, 95);
        assert_eq!(key("12A").step(1), key("1A"));
        assert_eq!(key("1A").step(-1), key("12A"));
    }

    #[test]
    fn test_compatible_keys_symmetry() {
        // Adjacency and relative relations are symmetric: if b is in a's
        // compatible set, a is in b's at the same score.
        for code in ["8A", "12B", "1A"] {
            let a = key(code);
            for (b, score) in a.compatible_keys() {
                let back = b.compatible_keys();
                assert!(
                    back.iter().any(|&(k, s)| k == a && s == score),
                    "{} -> {} not symmetric",
                    a,
                    b
                );
            }
        }
    }

    #[test]
    fn test_unknown_keys_score_neutral() {
        assert_eq!(harmonic_score_str("8A", "??").0, 50);
        assert_eq!(harmonic_score_str("", "8A").0, 50);
    }

    #[test]
    fn test_bpm_ladder() {
        assert_eq!(bpm_score(128.0, 128.0).score, 100);
        assert_eq!(bpm_score(128.0, 130.0).score, 100); // 1.56%
        assert_eq!(bpm_score(128.0, 132.0).score, 85); // 3.1%
        assert_eq!(bpm_score(128.0, 135.0).score, 70); // 5.5%
        assert_eq!(bpm_score(128.0, 138.0).score, 55); // 7.8%
        assert_eq!(bpm_score(120.0, 140.0).score, 25); // 16.7%
    }

    #[test]
    fn test_half_tempo_detection() {
        // 126 vs 63: the double of 63 matches exactly
        let score = bpm_score(126.0, 63.0);
        assert_eq!(score.score, 100);
        assert_eq!(score.factor, TempoFactor::DoubleTime);
        assert!((score.effective_bpm_b - 126.0).abs() < 1e-6);

        let score = bpm_score(70.0, 140.0);
        assert_eq!(score.score, 100);
        assert_eq!(score.factor, TempoFactor::HalfTime);
    }

    #[test]
    fn test_energy_score() {
        assert_eq!(energy_score(0.5, 0.5), 100);
        assert_eq!(energy_score(0.2, 0.7), 50);
        assert_eq!(energy_score(0.0, 1.0), 0);
    }

    #[test]
    fn test_identical_tracks_are_perfect() {
        let c = Compatibility::score(Some("8A"), Some("8A"), 124.0, 124.0, 0.6, 0.6);
        assert_eq!(c.overall, 100);
        assert_eq!(c.harmonic, 100);
        assert_eq!(c.bpm, 100);
        assert_eq!(c.energy, 100);
    }

    #[test]
    fn test_blend_predicates() {
        assert!(is_blend_safe(&key("8A"), &key("9A")));
        assert!(!is_blend_safe(&key("8A"), &key("2B")));
        assert!(requires_hard_cut(&key("8A"), &key("2B")));
        assert!(!requires_hard_cut(&key("8A"), &key("11A")));
    }
}
