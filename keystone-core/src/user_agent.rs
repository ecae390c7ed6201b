//! User-agent classification for the device session list
//!
//! Browser user agents embed each other's tokens (Edge and Opera both claim to
//! be Chrome, Chrome claims to be Safari), so the order of the checks matters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Browser {
    Edge,
    Opera,
    Chrome,
    Firefox,
    Safari,
    Unknown,
}

impl Browser {
    pub fn from_user_agent(ua: &str) -> Self {
        if ua.contains("Edg") {
            Browser::Edge
        } else if ua.contains("OPR") || ua.contains("Opera") {
            Browser::Opera
        } else if ua.contains("Chrome") || ua.contains("CriOS") {
            Browser::Chrome
        } else if ua.contains("Firefox") || ua.contains("FxiOS") {
            Browser::Firefox
        } else if ua.contains("Safari") {
            Browser::Safari
        } else {
            Browser::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Edge => "Edge",
            Browser::Opera => "Opera",
            Browser::Chrome => "Chrome",
            Browser::Firefox => "Firefox",
            Browser::Safari => "Safari",
            Browser::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingSystem {
    Windows,
    IPhone,
    IPad,
    MacOs,
    Android,
    Linux,
    Unknown,
}

impl OperatingSystem {
    pub fn from_user_agent(ua: &str) -> Self {
        // iOS before macOS ("like Mac OS X"), Android before Linux
        if ua.contains("Windows") {
            OperatingSystem::Windows
        } else if ua.contains("iPhone") {
            OperatingSystem::IPhone
        } else if ua.contains("iPad") {
            OperatingSystem::IPad
        } else if ua.contains("Mac OS") || ua.contains("Macintosh") {
            OperatingSystem::MacOs
        } else if ua.contains("Android") {
            OperatingSystem::Android
        } else if ua.contains("Linux") {
            OperatingSystem::Linux
        } else {
            OperatingSystem::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatingSystem::Windows => "Windows",
            OperatingSystem::IPhone | OperatingSystem::IPad => "iOS",
            OperatingSystem::MacOs => "macOS",
            OperatingSystem::Android => "Android",
            OperatingSystem::Linux => "Linux",
            OperatingSystem::Unknown => "Unknown",
        }
    }

    pub fn device_name(&self) -> &'static str {
        match self {
            OperatingSystem::Windows => "Windows PC",
            OperatingSystem::IPhone => "iPhone",
            OperatingSystem::IPad => "iPad",
            OperatingSystem::MacOs => "Mac",
            OperatingSystem::Android => "Android Device",
            OperatingSystem::Linux => "Linux PC",
            OperatingSystem::Unknown => "Unknown Device",
        }
    }
}

/// What the session list shows for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_name: String,
    pub browser: String,
    pub os: String,
}

impl DeviceInfo {
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        let ua = user_agent.unwrap_or_default();
        let browser = Browser::from_user_agent(ua);
        let os = OperatingSystem::from_user_agent(ua);

        Self {
            device_name: os.device_name().to_string(),
            browser: browser.as_str().to_string(),
            os: os.as_str().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
    const OPERA_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 OPR/106.0.0.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const CHROME_ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.144 Mobile Safari/537.36";
    const SAFARI_IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";

    #[test]
    fn test_browser_precedence() {
        assert_eq!(Browser::from_user_agent(CHROME_WINDOWS), Browser::Chrome);
        assert_eq!(Browser::from_user_agent(EDGE_WINDOWS), Browser::Edge);
        assert_eq!(Browser::from_user_agent(OPERA_MAC), Browser::Opera);
        assert_eq!(Browser::from_user_agent(SAFARI_IPHONE), Browser::Safari);
        assert_eq!(Browser::from_user_agent(FIREFOX_LINUX), Browser::Firefox);
        assert_eq!(Browser::from_user_agent("curl/8.4.0"), Browser::Unknown);
    }

    #[test]
    fn test_os_precedence() {
        assert_eq!(
            OperatingSystem::from_user_agent(SAFARI_IPHONE),
            OperatingSystem::IPhone
        );
        assert_eq!(
            OperatingSystem::from_user_agent(SAFARI_IPAD),
            OperatingSystem::IPad
        );
        assert_eq!(
            OperatingSystem::from_user_agent(OPERA_MAC),
            OperatingSystem::MacOs
        );
        assert_eq!(
            OperatingSystem::from_user_agent(CHROME_ANDROID),
            OperatingSystem::Android
        );
        assert_eq!(
            OperatingSystem::from_user_agent(FIREFOX_LINUX),
            OperatingSystem::Linux
        );
    }

    #[test]
    fn test_device_info() {
        let info = DeviceInfo::from_user_agent(Some(SAFARI_IPHONE));
        assert_eq!(info.device_name, "iPhone");
        assert_eq!(info.browser, "Safari");
        assert_eq!(info.os, "iOS");

        let info = DeviceInfo::from_user_agent(Some(CHROME_ANDROID));
        assert_eq!(info.device_name, "Android Device");
        assert_eq!(info.browser, "Chrome");

        let info = DeviceInfo::from_user_agent(Some(EDGE_WINDOWS));
        assert_eq!(info.device_name, "Windows PC");
        assert_eq!(info.browser, "Edge");
    }

    #[test]
    fn test_missing_user_agent() {
        let info = DeviceInfo::from_user_agent(None);
        assert_eq!(info.device_name, "Unknown Device");
        assert_eq!(info.browser, "Unknown");
        assert_eq!(info.os, "Unknown");
    }
}
