use std::path::{Path, PathBuf};

use admission::{EndpointKey, Protocol};

pub const SMB_DEFAULT_PORT: u16 = 445;
pub const SFTP_DEFAULT_PORT: u16 = 22;
pub const FTP_DEFAULT_PORT: u16 = 21;

// scheme prefix with one or more slashes; single letters stay local so that
// windows-style drive inputs ("C:/data") never parse as a scheme
static SCHEME_REGEX: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.-]+):/+(?P<rest>.*)$")
        .expect("scheme regex is valid")
});

// [user@]host[:port] with optional bracketed IPv6 host
static AUTHORITY_REGEX: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"^(?:(?P<user>[^@]+)@)?(?P<host>\[[^\]]+\]|[^:@\[\]]+)(?::(?P<port>[^:/]*))?$")
        .expect("authority regex is valid")
});

/// Cloud drive provider behind a `cloud://` path.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Provider {
    #[strum(to_string = "google_drive", serialize = "googledrive", serialize = "google")]
    #[serde(rename = "google_drive")]
    GoogleDrive,
    #[strum(to_string = "dropbox")]
    #[serde(rename = "dropbox")]
    Dropbox,
    #[strum(to_string = "onedrive")]
    #[serde(rename = "onedrive")]
    OneDrive,
}

/// Classified transfer path, the resolver's output.
///
/// Remote variants keep their default ports applied so that two spellings
/// of the same endpoint compare (and throttle) identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPath {
    Local(PathBuf),
    Smb {
        host: String,
        port: u16,
        share: String,
        /// Path below the share, no leading slash, `""` for the share root.
        path: String,
    },
    Sftp {
        user: Option<String>,
        host: String,
        port: u16,
        /// Absolute path on the server.
        path: String,
    },
    Ftp {
        host: String,
        port: u16,
        /// Absolute path on the server.
        path: String,
    },
    Cloud {
        provider: Provider,
        /// Provider-specific parent locator; `None` addresses the drive
        /// root. Dropbox locators carry a leading slash, other providers
        /// join segments bare.
        parent: Option<String>,
        name: String,
    },
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("missing host in {0:?}")]
    MissingHost(String),
    #[error("cannot parse endpoint in {0:?}")]
    InvalidEndpoint(String),
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
    #[error("smb path {0:?} is missing a share name")]
    MissingShare(String),
    #[error("unknown cloud provider {0:?}")]
    UnknownProvider(String),
    #[error("cloud path {0:?} is missing an id or path")]
    EmptyCloudPath(String),
}

/// Canonicalize the textual form of a path before classification.
///
/// Backslashes become slashes, runs of slashes collapse (the `//` of a
/// scheme is reconstructed), schemes are lowercased and one-slash scheme
/// forms (`cloud:/x`) are tolerated. Idempotent by construction.
pub fn normalize(raw: &str) -> String {
    let forward = raw.replace('\\', "/");
    if let Some(caps) = SCHEME_REGEX.captures(&forward) {
        let scheme = caps["scheme"].to_lowercase();
        let rest = collapse_slashes(&caps["rest"]);
        return format!("{scheme}://{rest}");
    }
    let collapsed = collapse_slashes(&forward);
    if forward.starts_with('/') {
        format!("/{collapsed}")
    } else {
        collapsed
    }
}

fn collapse_slashes(input: &str) -> String {
    input
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Classify a raw path string into a [`TransferPath`].
///
/// Anything without a recognized scheme is a local path; relative local
/// paths are joined to the current working directory.
pub fn resolve(raw: &str) -> Result<TransferPath, ParseError> {
    let normalized = normalize(raw);
    let Some(caps) = SCHEME_REGEX.captures(&normalized) else {
        return Ok(TransferPath::Local(absolutize(Path::new(&normalized))));
    };
    let scheme = &caps["scheme"];
    let rest = &caps["rest"];
    match scheme {
        "smb" => resolve_smb(raw, rest),
        "sftp" => resolve_sftp(raw, rest),
        "ftp" => resolve_ftp(raw, rest),
        "cloud" => resolve_cloud(raw, rest),
        other => Err(ParseError::UnsupportedScheme(other.to_string())),
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    // lexical absolutization; falls back to the relative form if the
    // process has no usable working directory
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

struct Authority {
    user: Option<String>,
    host: String,
    port: Option<u16>,
}

fn split_authority<'a>(raw: &str, rest: &'a str) -> Result<(Authority, &'a str), ParseError> {
    let (authority, path) = match rest.find('/') {
        Some(index) => (&rest[..index], &rest[index + 1..]),
        None => (rest, ""),
    };
    if authority.is_empty() {
        return Err(ParseError::MissingHost(raw.to_string()));
    }
    let caps = AUTHORITY_REGEX
        .captures(authority)
        .ok_or_else(|| ParseError::InvalidEndpoint(raw.to_string()))?;
    let port = match caps.name("port") {
        Some(port) => Some(
            port.as_str()
                .parse::<u16>()
                .map_err(|_| ParseError::InvalidPort(raw.to_string()))?,
        ),
        None => None,
    };
    Ok((
        Authority {
            user: caps.name("user").map(|user| user.as_str().to_string()),
            host: caps["host"].to_string(),
            port,
        },
        path,
    ))
}

fn resolve_smb(raw: &str, rest: &str) -> Result<TransferPath, ParseError> {
    // a user in an smb url is tolerated and ignored; credentials come from
    // the credential source, keyed by endpoint
    let (authority, path) = split_authority(raw, rest)?;
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());
    let share = segments
        .next()
        .ok_or_else(|| ParseError::MissingShare(raw.to_string()))?;
    let below = segments.collect::<Vec<_>>().join("/");
    Ok(TransferPath::Smb {
        host: authority.host,
        port: authority.port.unwrap_or(SMB_DEFAULT_PORT),
        share: share.to_string(),
        path: below,
    })
}

fn resolve_sftp(raw: &str, rest: &str) -> Result<TransferPath, ParseError> {
    let (authority, path) = split_authority(raw, rest)?;
    Ok(TransferPath::Sftp {
        user: authority.user,
        host: authority.host,
        port: authority.port.unwrap_or(SFTP_DEFAULT_PORT),
        path: format!("/{path}"),
    })
}

fn resolve_ftp(raw: &str, rest: &str) -> Result<TransferPath, ParseError> {
    let (authority, path) = split_authority(raw, rest)?;
    Ok(TransferPath::Ftp {
        host: authority.host,
        port: authority.port.unwrap_or(FTP_DEFAULT_PORT),
        path: format!("/{path}"),
    })
}

fn resolve_cloud(raw: &str, rest: &str) -> Result<TransferPath, ParseError> {
    let mut segments = rest.split('/').filter(|segment| !segment.is_empty());
    let alias = segments
        .next()
        .ok_or_else(|| ParseError::MissingHost(raw.to_string()))?;
    let provider = alias
        .parse::<Provider>()
        .map_err(|_| ParseError::UnknownProvider(alias.to_string()))?;
    let id_segments: Vec<&str> = segments.collect();
    let Some((name, parents)) = id_segments.split_last() else {
        return Err(ParseError::EmptyCloudPath(raw.to_string()));
    };
    let parent = if parents.is_empty() {
        None
    } else {
        let joined = parents.join("/");
        Some(match provider {
            Provider::Dropbox => format!("/{joined}"),
            _ => joined,
        })
    };
    Ok(TransferPath::Cloud {
        provider,
        parent,
        name: (*name).to_string(),
    })
}

impl TransferPath {
    pub fn protocol(&self) -> Protocol {
        match self {
            TransferPath::Local(_) => Protocol::Local,
            TransferPath::Smb { .. } => Protocol::Smb,
            TransferPath::Sftp { .. } => Protocol::Sftp,
            TransferPath::Ftp { .. } => Protocol::Ftp,
            TransferPath::Cloud { .. } => Protocol::Cloud,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, TransferPath::Local(_))
    }

    pub fn as_local(&self) -> Option<&Path> {
        match self {
            TransferPath::Local(path) => Some(path),
            _ => None,
        }
    }

    /// Throttling key of the physical link behind this path, `None` for
    /// local paths. Strategies may refine the cloud key with an account
    /// tag once one is known.
    pub fn endpoint_key(&self) -> Option<EndpointKey> {
        match self {
            TransferPath::Local(_) => None,
            TransferPath::Smb { host, port, .. } => {
                Some(EndpointKey::new(format!("smb://{host}:{port}")))
            }
            TransferPath::Sftp { host, port, .. } => {
                Some(EndpointKey::new(format!("sftp://{host}:{port}")))
            }
            TransferPath::Ftp { host, port, .. } => {
                Some(EndpointKey::new(format!("ftp://{host}:{port}")))
            }
            TransferPath::Cloud { provider, .. } => {
                Some(EndpointKey::new(format!("cloud://{provider}")))
            }
        }
    }

    /// Entry name, the final path component.
    pub fn name(&self) -> String {
        match self {
            TransferPath::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            TransferPath::Smb { share, path, .. } => match path.rsplit('/').next() {
                Some("") | None => share.clone(),
                Some(last) => last.to_string(),
            },
            TransferPath::Sftp { path, .. } | TransferPath::Ftp { path, .. } => path
                .rsplit('/')
                .find(|segment| !segment.is_empty())
                .unwrap_or("")
                .to_string(),
            TransferPath::Cloud { name, .. } => name.clone(),
        }
    }

    /// Same location with the final component replaced; `None` when the
    /// path has no replaceable name (a filesystem, share or server root).
    pub fn with_name(&self, new_name: &str) -> Option<TransferPath> {
        match self {
            TransferPath::Local(path) => path
                .parent()
                .map(|parent| TransferPath::Local(parent.join(new_name))),
            TransferPath::Smb {
                host,
                port,
                share,
                path,
            } => {
                if path.is_empty() {
                    return None;
                }
                let renamed = match path.rsplit_once('/') {
                    Some((parent, _)) => format!("{parent}/{new_name}"),
                    None => new_name.to_string(),
                };
                Some(TransferPath::Smb {
                    host: host.clone(),
                    port: *port,
                    share: share.clone(),
                    path: renamed,
                })
            }
            TransferPath::Sftp {
                user,
                host,
                port,
                path,
            } => rename_absolute(path, new_name).map(|renamed| TransferPath::Sftp {
                user: user.clone(),
                host: host.clone(),
                port: *port,
                path: renamed,
            }),
            TransferPath::Ftp { host, port, path } => {
                rename_absolute(path, new_name).map(|renamed| TransferPath::Ftp {
                    host: host.clone(),
                    port: *port,
                    path: renamed,
                })
            }
            TransferPath::Cloud {
                provider, parent, ..
            } => Some(TransferPath::Cloud {
                provider: *provider,
                parent: parent.clone(),
                name: new_name.to_string(),
            }),
        }
    }

    /// Full id-or-path form of a cloud path (parent locator + name).
    pub fn cloud_id_or_path(&self) -> Option<String> {
        match self {
            TransferPath::Cloud {
                provider,
                parent,
                name,
            } => Some(match parent {
                None => name.clone(),
                Some(parent) => {
                    let trimmed = match provider {
                        Provider::Dropbox => parent.trim_start_matches('/'),
                        _ => parent.as_str(),
                    };
                    format!("{trimmed}/{name}")
                }
            }),
            _ => None,
        }
    }
}

fn rename_absolute(path: &str, new_name: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rsplit_once('/') {
        Some((parent, _)) => Some(format!("{parent}/{new_name}")),
        None => None,
    }
}

impl std::fmt::Display for TransferPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferPath::Local(path) => write!(f, "{}", path.display()),
            TransferPath::Smb {
                host,
                port,
                share,
                path,
            } => {
                if path.is_empty() {
                    write!(f, "smb://{host}:{port}/{share}")
                } else {
                    write!(f, "smb://{host}:{port}/{share}/{path}")
                }
            }
            TransferPath::Sftp {
                user,
                host,
                port,
                path,
            } => match user {
                Some(user) => write!(f, "sftp://{user}@{host}:{port}{path}"),
                None => write!(f, "sftp://{host}:{port}{path}"),
            },
            TransferPath::Ftp { host, port, path } => write!(f, "ftp://{host}:{port}{path}"),
            TransferPath::Cloud { provider, .. } => {
                let id_or_path = self.cloud_id_or_path().unwrap_or_default();
                write!(f, "cloud://{provider}/{id_or_path}")
            }
        }
    }
}
