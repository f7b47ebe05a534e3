// Device and codec capability probe
//
// Everything here is a pure query over the runtime environment (user agent,
// touch support, recorder API). The result is computed once per session and
// handed explicitly to the acquirer and the recording engine.

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use super::backend::MediaRecorderApi;

/// H.264 profiles, preferred on Apple platforms (hardware encoder)
pub const APPLE_MIME_CANDIDATES: [&str; 5] = [
    "video/mp4;codecs=avc1.42E01E", // Baseline
    "video/mp4;codecs=avc1.4D001E", // Main
    "video/mp4;codecs=avc1.64001E", // High
    "video/mp4;codecs=h264",
    "video/mp4;codecs=H264",
];

/// WebM profiles; the bare container goes last and lets the runtime pick codecs
pub const GENERIC_MIME_CANDIDATES: [&str; 3] = [
    "video/webm;codecs=vp8,opus",
    "video/webm;codecs=vp9,opus",
    "video/webm",
];

/// Container type used when no profile was selected
pub const DEFAULT_CONTAINER: &str = "video/webm";

/// Platform flags derived from the user agent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlatformFlags {
    pub is_ios: bool,
    pub is_safari: bool,
    pub is_mac: bool,
    pub is_android: bool,
}

impl PlatformFlags {
    /// Detect the platform from a user-agent string
    ///
    /// iPadOS reports a desktop "Macintosh" agent, so a Mac agent with more
    /// than one touch point counts as iOS.
    pub fn from_user_agent(user_agent: &str, max_touch_points: u32) -> Self {
        let is_ios = ["iPad", "iPhone", "iPod"].iter().any(|d| user_agent.contains(d))
            || (max_touch_points > 1 && user_agent.contains("Macintosh"));

        let is_mac = ["Macintosh", "MacIntel", "MacPPC", "Mac68K"]
            .iter()
            .any(|m| user_agent.contains(m));

        let lower = user_agent.to_lowercase();
        let is_safari = match lower.find("safari") {
            Some(pos) => {
                let prefix = &lower[..pos];
                !prefix.contains("chrome") && !prefix.contains("android")
            }
            None => false,
        };

        Self {
            is_ios,
            is_safari,
            is_mac,
            is_android: user_agent.contains("Android"),
        }
    }

    /// iOS, Safari or macOS: prefer the native H.264 encoder
    pub fn is_apple(&self) -> bool {
        self.is_ios || self.is_safari || self.is_mac
    }
}

/// Capability snapshot for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceCapabilities {
    pub platform: PlatformFlags,
    /// The chunked-recording API exists
    pub recorder_supported: bool,
}

impl DeviceCapabilities {
    pub fn detect(user_agent: &str, max_touch_points: u32, recorder: &dyn MediaRecorderApi) -> Self {
        let capabilities = Self {
            platform: PlatformFlags::from_user_agent(user_agent, max_touch_points),
            recorder_supported: recorder.is_supported(),
        };

        info!(
            "Device capabilities: ios={}, safari={}, mac={}, android={}, recorder={}",
            capabilities.platform.is_ios,
            capabilities.platform.is_safari,
            capabilities.platform.is_mac,
            capabilities.platform.is_android,
            capabilities.recorder_supported
        );

        capabilities
    }
}

/// Container + codec combination used for recording output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MimeProfile(String);

impl MimeProfile {
    pub fn new(mime_type: impl Into<String>) -> Self {
        Self(mime_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_mp4(&self) -> bool {
        self.0.contains("mp4")
    }

    /// Media type the finished artifact is tagged with
    pub fn container(&self) -> String {
        if self.is_mp4() {
            return "video/mp4".to_string();
        }
        match self.0.split(';').next() {
            Some(essence) if !essence.trim().is_empty() => essence.trim().to_string(),
            _ => DEFAULT_CONTAINER.to_string(),
        }
    }
}

impl fmt::Display for MimeProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered candidate list for this platform
pub fn candidate_mime_types(platform: &PlatformFlags) -> Vec<&'static str> {
    if platform.is_apple() {
        APPLE_MIME_CANDIDATES
            .iter()
            .chain(GENERIC_MIME_CANDIDATES.iter())
            .copied()
            .collect()
    } else {
        GENERIC_MIME_CANDIDATES.to_vec()
    }
}

/// Pick the first candidate the recorder reports as supported
///
/// Returns `None` when the recorder API is missing or nothing matches; the
/// recorder then uses its own default.
pub fn select_mime_profile(
    capabilities: &DeviceCapabilities,
    recorder: &dyn MediaRecorderApi,
) -> Option<MimeProfile> {
    if !capabilities.recorder_supported {
        return None;
    }

    let selected = candidate_mime_types(&capabilities.platform)
        .into_iter()
        .find(|candidate| recorder.is_type_supported(candidate))
        .map(MimeProfile::new);

    match &selected {
        Some(profile) => info!("Selected recording profile: {}", profile),
        None => warn!("No specific recording profile supported, using recorder default"),
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const CHROME_MAC_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";

    #[test]
    fn test_iphone_is_ios_and_safari() {
        let flags = PlatformFlags::from_user_agent(IPHONE_UA, 5);
        assert!(flags.is_ios);
        assert!(flags.is_safari);
        assert!(!flags.is_android);
    }

    #[test]
    fn test_ipad_desktop_agent_detected_by_touch_points() {
        let ua = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15";
        assert!(PlatformFlags::from_user_agent(ua, 5).is_ios);
        assert!(!PlatformFlags::from_user_agent(ua, 0).is_ios);
    }

    #[test]
    fn test_chrome_on_mac_is_mac_not_safari() {
        let flags = PlatformFlags::from_user_agent(CHROME_MAC_UA, 0);
        assert!(flags.is_mac);
        assert!(!flags.is_safari);
        assert!(flags.is_apple());
    }

    #[test]
    fn test_android_chrome_is_not_safari() {
        let flags = PlatformFlags::from_user_agent(ANDROID_UA, 5);
        assert!(flags.is_android);
        assert!(!flags.is_safari);
        assert!(!flags.is_apple());
    }

    #[test]
    fn test_candidates_prefer_h264_on_apple() {
        let apple = PlatformFlags {
            is_mac: true,
            ..Default::default()
        };
        let list = candidate_mime_types(&apple);
        assert_eq!(list.len(), 8);
        assert_eq!(list[0], "video/mp4;codecs=avc1.42E01E");
        assert_eq!(list[7], "video/webm");

        let generic = candidate_mime_types(&PlatformFlags::default());
        assert_eq!(generic, vec!["video/webm;codecs=vp8,opus", "video/webm;codecs=vp9,opus", "video/webm"]);
    }

    #[test]
    fn test_mime_profile_container() {
        assert_eq!(MimeProfile::new("video/mp4;codecs=avc1.42E01E").container(), "video/mp4");
        assert_eq!(MimeProfile::new("video/webm;codecs=vp8,opus").container(), "video/webm");
        assert_eq!(MimeProfile::new("video/webm").container(), "video/webm");
    }
}
