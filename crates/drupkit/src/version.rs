//! Drupal version model.
//!
//! A project version has the form `<core>.x-<major>.<patch>[-<extra>]`,
//! e.g. `7.x-3.2-beta1` or `8.x-1.x-dev`. The part after the core prefix is
//! the "short" form; the full string is the "long" form.
//!
//! Versions are only ordered within the same [`VersionCore`]: comparing
//! `7.x-1.0` with `8.x-1.0` yields `None`.

use crate::error::{Error, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static CORE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(\.x)?($|-)").expect("valid core regex"));

static SHORT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+|x)(.*)$").expect("valid version regex"));

static LONG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.x-(\d+.+)$").expect("valid long version regex"));

static EXTRA_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]*)(\d*)$").expect("valid extra regex"));

/// The core compatibility line of a version, rendered as `<N>.x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionCore(u32);

impl VersionCore {
    /// Create a core from its number.
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    /// The core number, e.g. 7 for `7.x`.
    pub const fn number(self) -> u32 {
        self.0
    }
}

impl FromStr for VersionCore {
    type Err = Error;

    /// Accepts `8`, `8.x` and `8.x-1.0`, but not `8.0`, which cannot be
    /// told apart from a short project version.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        CORE_PATTERN
            .captures(s)
            .and_then(|caps| caps[1].parse().ok())
            .map(Self)
            .ok_or_else(|| Error::InvalidVersion(format!("wrong core specification: {s}")))
    }
}

impl fmt::Display for VersionCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.x", self.0)
    }
}

/// Patch level of a version. `x` denotes a development line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PatchLevel {
    /// The `x` of `1.x-dev`; sorts below every numbered patch level
    Development,
    /// A numbered patch level
    Number(u32),
}

impl fmt::Display for PatchLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "x"),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Release maturity, from least to most mature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stability {
    /// Unrecognized qualifier (kept verbatim for display)
    Unknown,
    /// `dev`, or any version with an `x` patch level
    Development,
    /// `unstable`
    Unstable,
    /// `alpha`
    Alpha,
    /// `beta`
    Beta,
    /// `rc`
    ReleaseCandidate,
    /// No qualifier
    Final,
}

impl Stability {
    fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "" => Self::Final,
            "dev" => Self::Development,
            "unstable" => Self::Unstable,
            "alpha" => Self::Alpha,
            "beta" => Self::Beta,
            "rc" => Self::ReleaseCandidate,
            _ => Self::Unknown,
        }
    }
}

/// A project version scoped to a [`VersionCore`].
///
/// Equality and ordering consider the core, major number, patch level,
/// stability tier and stability sequence number. The raw qualifier text is
/// kept for display only.
#[derive(Debug, Clone)]
pub struct Version {
    core: VersionCore,
    major: u32,
    patch: PatchLevel,
    stability: Stability,
    seq: Option<u32>,
    extra: String,
}

impl Version {
    /// Parse a short version string (e.g. `3.2-beta1`) for the given core.
    ///
    /// A redundant core prefix (`7.x-3.2` for core 7) is stripped first.
    pub fn new(core: VersionCore, short: &str) -> Result<Self> {
        let short = short.trim();
        let prefix = format!("{core}-");
        let short = short.strip_prefix(prefix.as_str()).unwrap_or(short);

        let caps = SHORT_PATTERN
            .captures(short)
            .ok_or_else(|| Error::InvalidVersion(short.to_string()))?;
        let major = caps[1]
            .parse()
            .map_err(|_| Error::InvalidVersion(short.to_string()))?;
        let patch = match &caps[2] {
            "x" => PatchLevel::Development,
            n => PatchLevel::Number(
                n.parse()
                    .map_err(|_| Error::InvalidVersion(short.to_string()))?,
            ),
        };

        let rest = &caps[3];
        let extra = rest.strip_prefix('-').unwrap_or(rest).to_string();
        let (mut stability, seq) = match EXTRA_PATTERN.captures(&extra) {
            Some(parts) => (Stability::from_label(&parts[1]), parts[2].parse().ok()),
            None => (Stability::Unknown, None),
        };
        if patch == PatchLevel::Development {
            stability = Stability::Development;
        }

        Ok(Self {
            core,
            major,
            patch,
            stability,
            seq,
            extra,
        })
    }

    /// Parse a long version string such as `7.x-1.0` or `8.x-2.x-dev`.
    pub fn from_long(long: &str) -> Result<Self> {
        let long = long.trim();
        let caps = LONG_PATTERN
            .captures(long)
            .ok_or_else(|| Error::InvalidVersion(format!("cannot build a version from {long}")))?;
        let core = caps[1]
            .parse()
            .map(VersionCore::new)
            .map_err(|_| Error::InvalidVersion(long.to_string()))?;
        Self::new(core, &caps[2])
    }

    /// The core compatibility line.
    pub fn core(&self) -> VersionCore {
        self.core
    }

    /// The major version number.
    pub fn major(&self) -> u32 {
        self.major
    }

    /// The patch level.
    pub fn patch(&self) -> PatchLevel {
        self.patch
    }

    /// The stability tier.
    pub fn stability(&self) -> Stability {
        self.stability
    }

    /// The stability sequence number, e.g. 2 in `1.0-rc2`.
    pub fn seq(&self) -> Option<u32> {
        self.seq
    }

    /// The qualifier as written, e.g. `beta12` or `dev`.
    pub fn extra(&self) -> &str {
        &self.extra
    }

    /// Short form, e.g. `3.2-beta1`.
    pub fn short(&self) -> String {
        if self.extra.is_empty() {
            format!("{}.{}", self.major, self.patch)
        } else {
            format!("{}.{}-{}", self.major, self.patch, self.extra)
        }
    }

    /// Long form, e.g. `7.x-3.2-beta1`.
    pub fn long(&self) -> String {
        format!("{}-{}", self.core, self.short())
    }

    /// Final release with a numbered patch level.
    pub fn is_stable(&self) -> bool {
        self.stability == Stability::Final && matches!(self.patch, PatchLevel::Number(_))
    }

    /// `rc` qualifier.
    pub fn is_release_candidate(&self) -> bool {
        self.stability == Stability::ReleaseCandidate
    }

    /// `alpha` qualifier.
    pub fn is_alpha(&self) -> bool {
        self.stability == Stability::Alpha
    }

    /// `beta` qualifier.
    pub fn is_beta(&self) -> bool {
        self.stability == Stability::Beta
    }

    /// `x` patch level.
    pub fn is_development_snapshot(&self) -> bool {
        self.patch == PatchLevel::Development
    }

    /// Compare by maturity first, then by natural order.
    ///
    /// Under this ordering any final release beats any release candidate,
    /// whatever their numbers. Returns `None` across cores.
    pub fn better(&self, other: &Self) -> Option<Ordering> {
        if self.core != other.core {
            return None;
        }
        Some(
            self.stability
                .cmp(&other.stability)
                .then_with(|| self.natural_cmp(other)),
        )
    }

    fn natural_cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.patch.cmp(&other.patch))
            .then(self.stability.cmp(&other.stability))
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.core == other.core
            && self.major == other.major
            && self.patch == other.patch
            && self.stability == other.stability
            && self.seq == other.seq
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.core != other.core {
            return None;
        }
        Some(self.natural_cmp(other))
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_long(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

/// Pick the best release among `candidates`.
///
/// Releases older than `current` are discarded. Among the rest, stable
/// releases are preferred whenever at least one exists; the winner is the
/// maximum under [`Version::better`].
pub fn best_release(
    candidates: impl IntoIterator<Item = Version>,
    current: Option<&Version>,
) -> Option<Version> {
    let eligible: Vec<Version> = candidates
        .into_iter()
        .filter(|v| {
            current.is_none_or(|c| v.partial_cmp(c).is_some_and(|o| o != Ordering::Less))
        })
        .collect();

    let stable: Vec<&Version> = eligible.iter().filter(|v| v.is_stable()).collect();
    let pool: Vec<&Version> = if stable.is_empty() {
        eligible.iter().collect()
    } else {
        stable
    };

    pool.into_iter()
        .max_by(|a, b| a.better(b).unwrap_or(Ordering::Equal))
        .cloned()
}
