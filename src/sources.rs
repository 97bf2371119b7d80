use anyhow::{Context, Result};
use ipnet::IpNet;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

/// Number of host addresses sampled from each CIDR by default.
pub const DEFAULT_PER_RANGE: usize = 9;

/// Something that hands the engine raw endpoint strings.
///
/// Sources may return duplicates and junk; the normalizer sorts that out.
pub trait CandidateSource: Send + Sync {
    fn name(&self) -> &str;
    fn candidates(&self) -> Result<Vec<String>>;
}

/// An in-memory list of endpoints.
#[derive(Debug, Clone)]
pub struct StaticSource {
    name: String,
    items: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(name: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

impl CandidateSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidates(&self) -> Result<Vec<String>> {
        Ok(self.items.clone())
    }
}

/// A text file with one endpoint per line.
#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
        }
    }
}

impl CandidateSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidates(&self) -> Result<Vec<String>> {
        load_candidates_from_path(&self.path)
    }
}

/// Sample host addresses from a list of CIDR ranges.
#[derive(Debug, Clone)]
pub struct CidrSource {
    name: String,
    ranges: Vec<IpNet>,
    per_range: usize,
}

impl CidrSource {
    pub fn new(ranges: Vec<IpNet>, per_range: usize) -> Self {
        Self {
            name: format!("{} cidr range(s)", ranges.len()),
            ranges,
            per_range,
        }
    }

    /// Parse CIDR strings, failing on the first invalid one.
    pub fn parse<I, S>(ranges: I, per_range: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ranges = ranges
            .into_iter()
            .map(|s| {
                let s = s.as_ref().trim();
                s.parse::<IpNet>()
                    .with_context(|| format!("invalid CIDR: {s}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(ranges, per_range))
    }
}

impl CandidateSource for CidrSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidates(&self) -> Result<Vec<String>> {
        Ok(self
            .ranges
            .iter()
            .flat_map(|net| sample_hosts(*net, self.per_range))
            .map(|ip| ip.to_string())
            .collect())
    }
}

/// The first `count` usable host addresses of a network.
///
/// For IPv4 networks larger than /31 the network and broadcast addresses are skipped.
pub fn sample_hosts(net: IpNet, count: usize) -> Vec<IpAddr> {
    net.hosts().take(count).collect()
}

/// Parse candidate file content.
///
/// Supported per line:
/// - a bare endpoint: `cf.example.com`, `104.16.0.1`
/// - an endpoint with a port suffix, as found in previous result files: `104.16.0.1:443`
/// - comments: everything after `#` is ignored
/// - only the first whitespace-separated token is used
pub fn parse_candidates_str(s: &str) -> Vec<String> {
    s.lines()
        .filter_map(|raw_line| {
            let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
            let token = line.split_whitespace().next()?;
            Some(strip_port(token).to_string())
        })
        .collect()
}

/// Load candidates from a file path. Errors if the file cannot be read.
pub fn load_candidates_from_path(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read candidates file: {}", path.as_ref().display()))?;
    Ok(parse_candidates_str(&content))
}

fn strip_port(token: &str) -> &str {
    // Bracketed IPv6 with port: `[::1]:443`
    if let Some(rest) = token.strip_prefix('[') {
        if let Some((host, _)) = rest.split_once("]:") {
            return &token[..host.len() + 2];
        }
        return token;
    }
    match token.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':')
                && !port.is_empty()
                && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => token,
    }
}
