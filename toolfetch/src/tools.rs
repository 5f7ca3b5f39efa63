//! Static definitions of the tools this crate knows how to install.
//!
//! Each [`Tool`] maps to a [`ToolSpec`] that carries, as data, where its
//! releases come from, how the right asset is picked and how the downloaded
//! archive is laid out. The pipeline in [`crate::installer`] is the same for
//! every tool.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, ToolFetchError};

/// Operating system and architecture pairs with distinct release assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows64,
    Linux64,
    LinuxArm64,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        match (std::env::consts::OS, std::env::consts::ARCH) {
            ("windows", "x86_64") => Self::Windows64,
            ("linux", "x86_64") => Self::Linux64,
            ("linux", "aarch64") => Self::LinuxArm64,
            ("macos", _) => Self::MacOs,
            _ => Self::Other,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Self::Windows64)
    }

    /// File name of an executable called `stem` on this platform.
    pub fn exe_name(&self, stem: &str) -> String {
        if self.is_windows() {
            format!("{stem}.exe")
        } else {
            stem.to_string()
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows64 => "windows-x86_64",
            Self::Linux64 => "linux-x86_64",
            Self::LinuxArm64 => "linux-aarch64",
            Self::MacOs => "macos",
            Self::Other => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Nightly master build of FFmpeg.
    FFmpeg,
    /// Newest numbered FFmpeg release build.
    FFmpegStable,
    NVEnc,
    QSVEnc,
    VCEEnc,
    /// Stand-alone 7-Zip console extractor.
    SevenZip,
}

impl Tool {
    pub fn all() -> &'static [Tool] {
        &[
            Self::FFmpeg,
            Self::FFmpegStable,
            Self::NVEnc,
            Self::QSVEnc,
            Self::VCEEnc,
            Self::SevenZip,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FFmpeg => "ffmpeg",
            Self::FFmpegStable => "ffmpeg-stable",
            Self::NVEnc => "nvenc",
            Self::QSVEnc => "qsvenc",
            Self::VCEEnc => "vceenc",
            Self::SevenZip => "7zip",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ffmpeg" | "ffmpeg-latest" => Ok(Self::FFmpeg),
            "ffmpeg-stable" => Ok(Self::FFmpegStable),
            "nvenc" | "nvencc" => Ok(Self::NVEnc),
            "qsvenc" | "qsvencc" => Ok(Self::QSVEnc),
            "vceenc" | "vceencc" => Ok(Self::VCEEnc),
            "7zip" | "7-zip" | "7zr" | "7z" => Ok(Self::SevenZip),
            _ => Err(format!(
                "Unknown tool '{s}'. Expected one of: {}",
                Tool::all()
                    .iter()
                    .map(|t| t.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

/// Where the downloadable asset for a tool is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// Latest release of a GitHub repository (`owner/name`).
    GithubLatest { repo: String },
    /// A fixed URL with no release feed in front of it.
    Direct { url: String, file_name: String },
}

/// How one asset is chosen from a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchRule {
    /// First asset, in listed order, whose name contains the substring.
    Contains(String),
    /// Asset with the greatest version captured by group 1 of the regex.
    Versioned(String),
}

/// How a downloaded file becomes an installed tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutRule {
    /// Archive holds exactly one top-level folder starting with
    /// `root_prefix`; its contents are moved into the install directory
    /// after deleting `stale` entries left by an earlier install.
    SingleRootFolder {
        root_prefix: String,
        stale: Vec<String>,
    },
    /// 7z archive flattened into the install directory by an external
    /// 7-Zip process; the executable is the first file matching the regex.
    FlatSevenZip { executable_pattern: String },
    /// The download is the executable itself.
    BareExecutable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    pub tool: Tool,
    pub display_name: String,
    /// Directory name under the data root.
    pub dir_name: String,
    pub source: AssetSource,
    pub match_rule: MatchRule,
    pub layout: LayoutRule,
    /// Executable path relative to the install directory.
    pub executable: String,
    /// Names tried on `PATH` when nothing is installed locally.
    pub search_names: Vec<String>,
    /// Human-facing page to consult when no asset matches.
    pub releases_page: String,
}

const FFMPEG_REPO: &str = "BtbN/FFmpeg-Builds";

impl ToolSpec {
    /// Definition of `tool` for `platform`.
    pub fn for_tool(tool: Tool, platform: Platform) -> Result<Self> {
        match tool {
            Tool::FFmpeg | Tool::FFmpegStable => ffmpeg_spec(tool, platform),
            Tool::NVEnc => rigaya_spec(tool, "NVEnc", platform),
            Tool::QSVEnc => rigaya_spec(tool, "QSVEnc", platform),
            Tool::VCEEnc => rigaya_spec(tool, "VCEEnc", platform),
            Tool::SevenZip => seven_zip_spec(platform),
        }
    }

    /// Release feed URL for GitHub-hosted tools.
    pub fn feed_url(&self, api_base: &str) -> Option<String> {
        match &self.source {
            AssetSource::GithubLatest { repo } => Some(github_feed_url(api_base, repo)),
            AssetSource::Direct { .. } => None,
        }
    }
}

/// `{api_base}/repos/{repo}/releases/latest`
pub fn github_feed_url(api_base: &str, repo: &str) -> String {
    format!(
        "{}/repos/{}/releases/latest",
        api_base.trim_end_matches('/'),
        repo
    )
}

fn unsupported(tool: Tool, platform: Platform) -> ToolFetchError {
    ToolFetchError::UnsupportedPlatform {
        tool: tool.to_string(),
        platform: platform.to_string(),
    }
}

fn ffmpeg_spec(tool: Tool, platform: Platform) -> Result<ToolSpec> {
    let (target, extension) = match platform {
        Platform::Windows64 => ("win64", "zip"),
        Platform::Linux64 => ("linux64", "tar.xz"),
        Platform::LinuxArm64 => ("linuxarm64", "tar.xz"),
        Platform::MacOs | Platform::Other => return Err(unsupported(tool, platform)),
    };

    let match_rule = if tool == Tool::FFmpegStable {
        MatchRule::Versioned(format!(
            r"ffmpeg-n(\d+(?:\.\d+)*)-latest-{target}-gpl-.*\.{}$",
            regex::escape(extension)
        ))
    } else {
        MatchRule::Contains(format!("master-latest-{target}-gpl.{extension}"))
    };

    Ok(ToolSpec {
        tool,
        display_name: "FFmpeg".to_string(),
        dir_name: "FFmpeg".to_string(),
        source: AssetSource::GithubLatest {
            repo: FFMPEG_REPO.to_string(),
        },
        match_rule,
        layout: LayoutRule::SingleRootFolder {
            root_prefix: "ffmpeg-".to_string(),
            stale: vec!["bin".to_string(), "doc".to_string(), "LICENSE.txt".to_string()],
        },
        executable: format!("bin/{}", platform.exe_name("ffmpeg")),
        search_names: vec!["ffmpeg".to_string()],
        releases_page: format!("https://github.com/{FFMPEG_REPO}/releases/"),
    })
}

fn rigaya_spec(tool: Tool, app_name: &str, platform: Platform) -> Result<ToolSpec> {
    if !platform.is_windows() {
        return Err(unsupported(tool, platform));
    }
    Ok(ToolSpec {
        tool,
        display_name: app_name.to_string(),
        dir_name: app_name.to_string(),
        source: AssetSource::GithubLatest {
            repo: format!("rigaya/{app_name}"),
        },
        match_rule: MatchRule::Contains("x64.7z".to_string()),
        layout: LayoutRule::FlatSevenZip {
            executable_pattern: format!(r"^{}.*64\.exe$", regex::escape(app_name)),
        },
        executable: format!("{app_name}C64.exe"),
        search_names: vec![format!("{app_name}C64"), format!("{app_name}C")],
        releases_page: format!("https://github.com/rigaya/{app_name}/releases/"),
    })
}

fn seven_zip_spec(platform: Platform) -> Result<ToolSpec> {
    // 7zr.exe is a Windows binary; other platforms rely on their own packages.
    if !platform.is_windows() {
        return Err(unsupported(Tool::SevenZip, platform));
    }
    Ok(ToolSpec {
        tool: Tool::SevenZip,
        display_name: "7-Zip".to_string(),
        dir_name: "7-Zip".to_string(),
        source: AssetSource::Direct {
            url: "https://www.7-zip.org/a/7zr.exe".to_string(),
            file_name: "7zr.exe".to_string(),
        },
        match_rule: MatchRule::Contains("7zr.exe".to_string()),
        layout: LayoutRule::BareExecutable,
        executable: "7zr.exe".to_string(),
        search_names: vec!["7zr".to_string(), "7z".to_string()],
        releases_page: "https://www.7-zip.org/download.html".to_string(),
    })
}
