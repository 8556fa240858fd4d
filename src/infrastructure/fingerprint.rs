//! 请求指纹轮换 - 基础设施层
//!
//! 每次出站请求随机挑选一套完整的浏览器请求头，避免单一指纹被反爬策略盯上。
//! 指纹只影响成功率，不影响结果的正确性。

use phf::phf_map;
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::SeedableRng;
use std::sync::Mutex;

/// 一套浏览器/系统组合对应的请求头
#[derive(Debug)]
pub struct Profile {
    pub browser: &'static str,
    pub platform: &'static str,
    pub headers: &'static [(&'static str, &'static str)],
}

/// 指纹目录，每个条目内部的请求头互相一致
static PROFILES: phf::Map<&'static str, Profile> = phf_map! {
    "chrome-windows" => Profile {
        browser: "chrome",
        platform: "windows",
        headers: &[
            ("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"),
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Sec-CH-UA", "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
            ("Sec-CH-UA-Mobile", "?0"),
            ("Sec-CH-UA-Platform", "\"Windows\""),
            ("Upgrade-Insecure-Requests", "1"),
        ],
    },
    "chrome-macos" => Profile {
        browser: "chrome",
        platform: "macos",
        headers: &[
            ("User-Agent", "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36"),
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Sec-CH-UA", "\"Chromium\";v=\"124\", \"Google Chrome\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
            ("Sec-CH-UA-Mobile", "?0"),
            ("Sec-CH-UA-Platform", "\"macOS\""),
            ("Upgrade-Insecure-Requests", "1"),
        ],
    },
    "edge-windows" => Profile {
        browser: "edge",
        platform: "windows",
        headers: &[
            ("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0"),
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.9"),
            ("Sec-CH-UA", "\"Chromium\";v=\"124\", \"Microsoft Edge\";v=\"124\", \"Not-A.Brand\";v=\"99\""),
            ("Sec-CH-UA-Mobile", "?0"),
            ("Sec-CH-UA-Platform", "\"Windows\""),
            ("Upgrade-Insecure-Requests", "1"),
        ],
    },
    "firefox-windows" => Profile {
        browser: "firefox",
        platform: "windows",
        headers: &[
            ("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0"),
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.5"),
            ("Upgrade-Insecure-Requests", "1"),
        ],
    },
    "firefox-linux" => Profile {
        browser: "firefox",
        platform: "linux",
        headers: &[
            ("User-Agent", "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0"),
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.5"),
            ("Upgrade-Insecure-Requests", "1"),
        ],
    },
    "safari-macos" => Profile {
        browser: "safari",
        platform: "macos",
        headers: &[
            ("User-Agent", "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15"),
            ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
            ("Accept-Language", "en-US,en;q=0.9"),
        ],
    },
};

/// 选中的指纹，可以在不修改目录的前提下附加 Referer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub name: &'static str,
    pub headers: Vec<(&'static str, String)>,
}

impl Fingerprint {
    fn from_profile(name: &&'static str, profile: &'static Profile) -> Self {
        Self {
            name: *name,
            headers: profile
                .headers
                .iter()
                .map(|(key, value)| (*key, (*value).to_string()))
                .collect(),
        }
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.header("User-Agent")
    }
}

/// 指纹轮换器
///
/// 职责：
/// - 从固定目录中均匀随机挑选指纹
/// - 指纹不归属任何条目，每次请求都重新挑选
pub struct FingerprintRotator {
    rng: Mutex<StdRng>,
}

impl FingerprintRotator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// 固定随机种子，用于测试
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn catalogue_size() -> usize {
        PROFILES.len()
    }

    pub fn profile_names() -> impl Iterator<Item = &'static str> {
        PROFILES.keys().copied()
    }

    /// 按名称取指纹
    pub fn profile(name: &str) -> Option<Fingerprint> {
        PROFILES
            .get_entry(name)
            .map(|(key, profile)| Fingerprint::from_profile(key, profile))
    }

    /// 均匀随机挑选一个指纹
    pub fn next_profile(&self) -> Fingerprint {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match PROFILES.entries().choose(&mut *rng) {
            Some((name, profile)) => Fingerprint::from_profile(name, profile),
            None => unreachable!("指纹目录为空"),
        }
    }

    /// 合并可选的 Referer，返回新的指纹，不修改传入的指纹
    pub fn with_referer(profile: &Fingerprint, referer: Option<&str>) -> Fingerprint {
        let mut merged = profile.clone();
        if let Some(referer) = referer.filter(|r| !r.is_empty()) {
            merged.headers.retain(|(k, _)| !k.eq_ignore_ascii_case("Referer"));
            merged.headers.push(("Referer", referer.to_string()));
        }
        merged
    }
}

impl Default for FingerprintRotator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_every_profile_has_user_agent_and_accept() {
        for name in FingerprintRotator::profile_names() {
            let profile = FingerprintRotator::profile(name).unwrap();
            assert!(profile.user_agent().is_some(), "{} 缺少 User-Agent", name);
            assert!(profile.header("Accept").is_some(), "{} 缺少 Accept", name);
        }
    }

    #[test]
    fn test_client_hints_only_on_chromium_profiles() {
        for name in FingerprintRotator::profile_names() {
            let profile = FingerprintRotator::profile(name).unwrap();
            let ua = profile.user_agent().unwrap();
            let has_hints = profile.header("Sec-CH-UA").is_some();
            assert_eq!(has_hints, ua.contains("Chrome/"), "{} 请求头不一致", name);
        }
    }

    #[test]
    fn test_next_profile_covers_catalogue() {
        let rotator = FingerprintRotator::seeded(7);
        let seen: HashSet<&str> = (0..500).map(|_| rotator.next_profile().name).collect();
        assert_eq!(seen.len(), FingerprintRotator::catalogue_size());
    }

    #[test]
    fn test_with_referer_does_not_mutate_base() {
        let base = FingerprintRotator::profile("firefox-linux").unwrap();
        let merged = FingerprintRotator::with_referer(&base, Some("https://ref.example"));

        assert_eq!(merged.header("Referer"), Some("https://ref.example"));
        assert_eq!(base.header("Referer"), None);
        assert_eq!(merged.headers.len(), base.headers.len() + 1);

        let unchanged = FingerprintRotator::with_referer(&base, None);
        assert_eq!(unchanged, base);
    }
}
