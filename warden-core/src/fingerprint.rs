//! Coarse device fingerprints.
//!
//! A [`Fingerprint`] is the triple `{browser family, OS family, device class}`
//! derived from whatever the client reports about itself. It is deliberately
//! low-entropy: two Chrome browsers on two Windows laptops share a
//! fingerprint. The value is only ever used as a lookup key for trusted
//! devices; the raw user-agent string never reaches a security decision.
//!
//! # Example
//!
//! ```
//! use warden_core::fingerprint::{DeviceSignals, classify};
//!
//! let signals = DeviceSignals::from_user_agent(
//!     "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
//!      (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
//! );
//! assert_eq!(classify(&signals).to_string(), "Chrome/Windows/Desktop");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// What the client told us about the device it is running on.
///
/// Explicit hints take precedence over anything parsed from `user_agent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSignals {
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub os: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
}

impl DeviceSignals {
    pub fn from_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
            ..Default::default()
        }
    }

    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = Some(browser.into());
        self
    }

    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = Some(os.into());
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    fn hint(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Safari,
    Edge,
    Opera,
    Samsung,
    Unknown,
}

impl BrowserFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserFamily::Chrome => "Chrome",
            BrowserFamily::Firefox => "Firefox",
            BrowserFamily::Safari => "Safari",
            BrowserFamily::Edge => "Edge",
            BrowserFamily::Opera => "Opera",
            BrowserFamily::Samsung => "Samsung",
            BrowserFamily::Unknown => "Unknown",
        }
    }

    /// Map a free-form browser name to its family.
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "chrome" | "google chrome" | "chromium" | "chrome mobile" | "chrome ios" => {
                BrowserFamily::Chrome
            }
            "firefox" | "mozilla firefox" | "firefox mobile" | "firefox ios" => {
                BrowserFamily::Firefox
            }
            "safari" | "mobile safari" => BrowserFamily::Safari,
            "edge" | "microsoft edge" => BrowserFamily::Edge,
            "opera" | "opera mobile" => BrowserFamily::Opera,
            "samsung" | "samsung internet" | "samsungbrowser" => BrowserFamily::Samsung,
            _ => BrowserFamily::Unknown,
        }
    }

    fn from_user_agent(ua: &str) -> Self {
        // Order matters: most Chromium derivatives also advertise Chrome and Safari.
        if ua.contains("SamsungBrowser/") {
            BrowserFamily::Samsung
        } else if ["Edg/", "Edge/", "EdgA/", "EdgiOS/"]
            .iter()
            .any(|t| ua.contains(t))
        {
            BrowserFamily::Edge
        } else if ua.contains("OPR/") || ua.contains("Opera") {
            BrowserFamily::Opera
        } else if ua.contains("Firefox/") || ua.contains("FxiOS/") {
            BrowserFamily::Firefox
        } else if ua.contains("Chrome/") || ua.contains("CriOS/") || ua.contains("Chromium/") {
            BrowserFamily::Chrome
        } else if ua.contains("Safari/") {
            BrowserFamily::Safari
        } else {
            BrowserFamily::Unknown
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    Windows,
    MacOs,
    Ios,
    Android,
    Linux,
    ChromeOs,
    Unknown,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Windows => "Windows",
            OsFamily::MacOs => "macOS",
            OsFamily::Ios => "iOS",
            OsFamily::Android => "Android",
            OsFamily::Linux => "Linux",
            OsFamily::ChromeOs => "ChromeOS",
            OsFamily::Unknown => "Unknown",
        }
    }

    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "windows" | "win32" | "win64" | "windows nt" => OsFamily::Windows,
            "macos" | "mac os" | "mac os x" | "os x" | "macintosh" | "mac" => OsFamily::MacOs,
            "ios" | "ipados" | "iphone os" => OsFamily::Ios,
            "android" => OsFamily::Android,
            "linux" | "ubuntu" | "debian" | "fedora" | "x11" => OsFamily::Linux,
            "chromeos" | "chrome os" | "cros" => OsFamily::ChromeOs,
            _ => OsFamily::Unknown,
        }
    }

    fn from_user_agent(ua: &str) -> Self {
        // iPadOS and iOS user agents contain "like Mac OS X"; Android contains "Linux".
        if ua.contains("Windows") {
            OsFamily::Windows
        } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod") {
            OsFamily::Ios
        } else if ua.contains("Android") {
            OsFamily::Android
        } else if ua.contains("CrOS") {
            OsFamily::ChromeOs
        } else if ua.contains("Macintosh") || ua.contains("Mac OS X") {
            OsFamily::MacOs
        } else if ua.contains("Linux") || ua.contains("X11") {
            OsFamily::Linux
        } else {
            OsFamily::Unknown
        }
    }

    fn is_desktop(&self) -> bool {
        matches!(
            self,
            OsFamily::Windows | OsFamily::MacOs | OsFamily::Linux | OsFamily::ChromeOs
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Desktop => "Desktop",
            DeviceClass::Mobile => "Mobile",
            DeviceClass::Tablet => "Tablet",
            DeviceClass::Unknown => "Unknown",
        }
    }

    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_ascii_lowercase().as_str() {
            "desktop" | "laptop" | "pc" => DeviceClass::Desktop,
            "mobile" | "phone" | "smartphone" => DeviceClass::Mobile,
            "tablet" => DeviceClass::Tablet,
            _ => DeviceClass::Unknown,
        }
    }

    fn from_user_agent(ua: &str, os: OsFamily) -> Self {
        if ua.contains("iPad")
            || ua.contains("Tablet")
            || (ua.contains("Android") && !ua.contains("Mobile"))
        {
            DeviceClass::Tablet
        } else if ua.contains("Mobi") || ua.contains("iPhone") || ua.contains("iPod") {
            DeviceClass::Mobile
        } else if os.is_desktop() {
            DeviceClass::Desktop
        } else {
            DeviceClass::Unknown
        }
    }
}

/// Stable composite key identifying a class of device.
///
/// Displays and parses as `Browser/Os/Device`, e.g. `Firefox/macOS/Desktop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint {
    pub browser: BrowserFamily,
    pub os: OsFamily,
    pub device: DeviceClass,
}

impl Fingerprint {
    pub fn new(browser: BrowserFamily, os: OsFamily, device: DeviceClass) -> Self {
        Self {
            browser,
            os,
            device,
        }
    }

    /// Human-readable description used in notifications.
    pub fn description(&self) -> String {
        let browser = match self.browser {
            BrowserFamily::Unknown => "Unknown browser",
            BrowserFamily::Samsung => "Samsung Internet",
            other => other.as_str(),
        };
        let os = match self.os {
            OsFamily::Unknown => "an unknown system",
            other => other.as_str(),
        };
        let device = match self.device {
            DeviceClass::Unknown => "unknown device",
            other => other.as_str(),
        };
        format!("{browser} on {os} ({device})")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.browser.as_str(),
            self.os.as_str(),
            self.device.as_str()
        )
    }
}

impl FromStr for Fingerprint {
    type Err = ValidationError;

    /// Parse a canonical fingerprint key. Unlike [`classify`], this is strict:
    /// each segment must be a canonical family name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidField(format!("fingerprint: {s}"));

        let mut parts = s.split('/');
        let (Some(browser), Some(os), Some(device), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let browser = match browser {
            "Unknown" => BrowserFamily::Unknown,
            other => match BrowserFamily::from_hint(other) {
                BrowserFamily::Unknown => return Err(invalid()),
                family => family,
            },
        };
        let os = match os {
            "Unknown" => OsFamily::Unknown,
            other => match OsFamily::from_hint(other) {
                OsFamily::Unknown => return Err(invalid()),
                family => family,
            },
        };
        let device = match device {
            "Unknown" => DeviceClass::Unknown,
            other => match DeviceClass::from_hint(other) {
                DeviceClass::Unknown => return Err(invalid()),
                class => class,
            },
        };

        Ok(Fingerprint::new(browser, os, device))
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_string()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Derive a fingerprint from client-reported signals.
///
/// Pure and total: unrecognised input lands in the `Unknown` bucket of its
/// axis and never fails.
pub fn classify(signals: &DeviceSignals) -> Fingerprint {
    let ua = signals.user_agent.as_deref().unwrap_or_default();

    let browser = match DeviceSignals::hint(&signals.browser) {
        Some(hint) => BrowserFamily::from_hint(hint),
        None => BrowserFamily::from_user_agent(ua),
    };
    let os = match DeviceSignals::hint(&signals.os) {
        Some(hint) => OsFamily::from_hint(hint),
        None => OsFamily::from_user_agent(ua),
    };
    let device = match DeviceSignals::hint(&signals.device) {
        Some(hint) => DeviceClass::from_hint(hint),
        None => DeviceClass::from_user_agent(ua, os),
    };

    Fingerprint::new(browser, os, device)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
    const FIREFOX_MAC: &str =
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14.4; rv:125.0) Gecko/20100101 Firefox/125.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
    const SAFARI_IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.51";
    const CHROME_ANDROID_PHONE: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36";
    const SAMSUNG_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) SamsungBrowser/24.0 Chrome/117.0.0.0 Safari/537.36";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0";
    const CHROME_OS: &str = "Mozilla/5.0 (X11; CrOS x86_64 14541.0.0) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

    fn fp(ua: &str) -> String {
        classify(&DeviceSignals::from_user_agent(ua)).to_string()
    }

    #[test]
    fn test_classify_common_user_agents() {
        assert_eq!(fp(CHROME_WINDOWS), "Chrome/Windows/Desktop");
        assert_eq!(fp(FIREFOX_MAC), "Firefox/macOS/Desktop");
        assert_eq!(fp(SAFARI_IPHONE), "Safari/iOS/Mobile");
        assert_eq!(fp(SAFARI_IPAD), "Safari/iOS/Tablet");
        assert_eq!(fp(EDGE_WINDOWS), "Edge/Windows/Desktop");
        assert_eq!(fp(CHROME_ANDROID_PHONE), "Chrome/Android/Mobile");
        assert_eq!(fp(SAMSUNG_TABLET), "Samsung/Android/Tablet");
        assert_eq!(fp(FIREFOX_LINUX), "Firefox/Linux/Desktop");
        assert_eq!(fp(CHROME_OS), "Chrome/ChromeOS/Desktop");
    }

    #[test]
    fn test_classify_is_deterministic() {
        let signals = DeviceSignals::from_user_agent(FIREFOX_MAC);
        assert_eq!(classify(&signals), classify(&signals.clone()));
    }

    #[test]
    fn test_unknown_inputs_map_to_unknown_bucket() {
        assert_eq!(fp(""), "Unknown/Unknown/Unknown");
        assert_eq!(fp("curl/8.4.0"), "Unknown/Unknown/Unknown");

        let signals = DeviceSignals::default()
            .with_browser("Netscape Navigator")
            .with_os("BeOS")
            .with_device("toaster");
        assert_eq!(classify(&signals).to_string(), "Unknown/Unknown/Unknown");
    }

    #[test]
    fn test_explicit_hints_override_user_agent() {
        let signals = DeviceSignals::from_user_agent(CHROME_WINDOWS)
            .with_browser("Mozilla Firefox")
            .with_os("Mac OS X")
            .with_device("desktop");
        assert_eq!(classify(&signals).to_string(), "Firefox/macOS/Desktop");
    }

    #[test]
    fn test_blank_hints_are_ignored() {
        let signals = DeviceSignals::from_user_agent(CHROME_WINDOWS).with_browser("   ");
        assert_eq!(classify(&signals).to_string(), "Chrome/Windows/Desktop");
    }

    #[test]
    fn test_hint_only_signals() {
        let signals = DeviceSignals::default()
            .with_browser("chrome")
            .with_os("windows");
        // Device inferred from a desktop OS
        assert_eq!(classify(&signals).to_string(), "Chrome/Windows/Desktop");
    }

    #[test]
    fn test_fingerprint_round_trips_through_key() {
        let fingerprint = Fingerprint::new(
            BrowserFamily::Firefox,
            OsFamily::MacOs,
            DeviceClass::Desktop,
        );
        let parsed: Fingerprint = fingerprint.to_string().parse().unwrap();
        assert_eq!(parsed, fingerprint);

        let unknown: Fingerprint = "Unknown/Unknown/Unknown".parse().unwrap();
        assert_eq!(unknown.browser, BrowserFamily::Unknown);
    }

    #[test]
    fn test_fingerprint_parse_rejects_malformed_keys() {
        assert!("Chrome/Windows".parse::<Fingerprint>().is_err());
        assert!("Chrome/Windows/Desktop/Extra".parse::<Fingerprint>().is_err());
        assert!("Lynx/Windows/Desktop".parse::<Fingerprint>().is_err());
    }

    #[test]
    fn test_fingerprint_serializes_as_key() {
        let fingerprint = classify(&DeviceSignals::from_user_agent(CHROME_WINDOWS));
        let json = serde_json::to_string(&fingerprint).unwrap();
        assert_eq!(json, "\"Chrome/Windows/Desktop\"");
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fingerprint);
    }

    #[test]
    fn test_description() {
        let fingerprint = classify(&DeviceSignals::from_user_agent(FIREFOX_MAC));
        assert_eq!(fingerprint.description(), "Firefox on macOS (Desktop)");

        let unknown = classify(&DeviceSignals::default());
        assert_eq!(
            unknown.description(),
            "Unknown browser on an unknown system (unknown device)"
        );
    }
}
