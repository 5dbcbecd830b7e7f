//! 시맨틱 버전 비교 유틸리티
//!
//! 릴리즈 태그는 저장소마다 표기가 다르다 (`v1.2.0`, `1.2.0`, `ares-v1.2.0` ...).
//! 태그 → 버전 변환은 [`parse_tag`], 버전 → 태그 후보는 [`tag_candidates`]가 담당한다.

use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// 시맨틱 버전 (major.minor.patch[-prerelease][+build])
///
/// build 메타데이터는 비교/동등성에 참여하지 않는다.
#[derive(Debug, Clone)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub prerelease: Option<String>,
    pub build: Option<String>,
}

impl SemVer {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch, prerelease: None, build: None }
    }

    /// "1.2.3", "1.0.0-beta.1", "1.0.0+abc" 형식을 파싱
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (rest, build) = match s.split_once('+') {
            Some((head, meta)) => (head, Some(meta)),
            None => (s, None),
        };
        let (version_part, prerelease) = match rest.split_once('-') {
            Some((head, pre)) => (head, Some(pre)),
            None => (rest, None),
        };

        let parts: Vec<&str> = version_part.split('.').collect();
        if parts.len() != 3 {
            return None;
        }
        let numeric = |p: &str| -> Option<u64> {
            if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            p.parse().ok()
        };
        let major = numeric(parts[0])?;
        let minor = numeric(parts[1])?;
        let patch = numeric(parts[2])?;

        let valid_ident = |id: &str| {
            !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        };
        if let Some(pre) = prerelease {
            if !pre.split('.').all(valid_ident) {
                return None;
            }
        }
        if let Some(meta) = build {
            if !meta.split('.').all(valid_ident) {
                return None;
            }
        }

        Some(Self {
            major,
            minor,
            patch,
            prerelease: prerelease.map(str::to_string),
            build: build.map(str::to_string),
        })
    }

    /// 현재 버전보다 새로운 버전인지 확인
    pub fn is_newer_than(&self, other: &SemVer) -> bool {
        self > other
    }

    /// 프리릴리스 여부
    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// build 메타데이터를 뺀 정규화 문자열 (메타데이터 사이드카 저장 형식)
    pub fn to_normalized_string(&self) -> String {
        let mut s = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if let Some(ref pre) = self.prerelease {
            s.push('-');
            s.push_str(pre);
        }
        s
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_normalized_string())?;
        if let Some(ref meta) = self.build {
            write!(f, "+{}", meta)?;
        }
        Ok(())
    }
}

/// JSON에서는 문자열 (`"1.2.0-beta.1"`)
impl Serialize for SemVer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SemVer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SemVer::parse(&s).ok_or_else(|| de::Error::custom(format!("invalid semantic version '{}'", s)))
    }
}

impl PartialEq for SemVer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemVer {}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater, // 정식 > 프리릴리스
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            })
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 프리릴리스 식별자 비교: 숫자끼리는 수치, 숫자 < 문자열, 나머지는 사전순
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

// ─── 태그 ↔ 버전 ─────────────────────────────────────────────

/// 선행 'v' 하나를 제거 (바로 뒤가 숫자일 때만)
pub fn normalize_tag(tag: &str) -> &str {
    let trimmed = tag.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some('v' | 'V'), Some(d)) if d.is_ascii_digit() => &trimmed[1..],
        _ => trimmed,
    }
}

fn embedded_version_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        match Regex::new(r"[vV](\d+\.\d+\.\d+(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?)$") {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!("Invalid tag pattern: {}", e);
                None
            }
        }
    })
    .as_ref()
}

/// 릴리즈 태그를 버전으로 변환. 파싱할 수 없는 태그는 `None` (건너뜀 대상)
///
/// 순서: 'v' 제거한 태그 → 원본 태그 → 태그 끝에 박힌 `v<버전>` (예: `ares-v1.2.0`)
pub fn parse_tag(tag: &str) -> Option<SemVer> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        return None;
    }
    SemVer::parse(normalize_tag(trimmed))
        .or_else(|| SemVer::parse(trimmed))
        .or_else(|| {
            embedded_version_regex()?
                .captures(trimmed)
                .and_then(|c| c.get(1))
                .and_then(|m| SemVer::parse(m.as_str()))
        })
}

/// 특정 버전의 릴리즈를 태그로 찾을 때 시도할 후보 목록 (중복 제거, 순서 유지)
pub fn tag_candidates(version: &SemVer) -> Vec<String> {
    let normalized = version.to_normalized_string();
    let full = version.to_string();
    let mut out: Vec<String> = Vec::with_capacity(4);
    for candidate in [
        normalized.clone(),
        format!("v{}", normalized),
        full.clone(),
        format!("v{}", full),
    ] {
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

/// `others`가 비었거나 `version >= max(others)`이면 true
pub fn is_greatest(version: &SemVer, others: &[SemVer]) -> bool {
    match latest(others) {
        Some(max) => version >= max,
        None => true,
    }
}

/// 가장 높은 버전 (동률이면 어느 쪽이든 무방)
pub fn latest(versions: &[SemVer]) -> Option<&SemVer> {
    versions.iter().max()
}
