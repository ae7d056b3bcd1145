//! Filesystem side of the decoders: gathering input files for packing,
//! selecting members by name and writing them under a destination directory.
//!
//! ```no_run
//! use bimx::archive::{unpack_bxpk, ExtractOptions};
//!
//! let buf = std::fs::read("model.bimx")?;
//! let opts = ExtractOptions::for_archive("model.bimx");
//! let report = unpack_bxpk(&buf, &opts)?;
//! println!("{} member(s) written to {}", report.written.len(), opts.destination.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use regex::Regex;
use thiserror::Error;
use walkdir::WalkDir;

use crate::bxpk::{self, Member};
use crate::codec::Decompress;
use crate::error::FormatError;
use crate::zres;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

// ── PackOptions ───────────────────────────────────────────────────────────────

/// How input paths are turned into member names by [`collect_inputs`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PackOptions {
    /// Descend into directories instead of skipping them.
    pub recursive: bool,
    /// Use only the file name as the member name.
    pub flatten:   bool,
}

/// Path argument meaning standard input (or standard output for `-o`).
pub const STDIO_PATH: &str = "-";

/// Member name given to data read from standard input.
pub const STDIN_MEMBER: &str = "<stdin>";

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO_PATH
}

/// Resolve `paths` into `(member name, file)` pairs, in argument order.
/// `-` stands for standard input; paths that do not exist are skipped with
/// a warning.
pub fn collect_inputs(paths: &[PathBuf], opts: &PackOptions) -> io::Result<Vec<(String, PathBuf)>> {
    let mut out = Vec::new();
    for path in paths {
        if is_stdio(path) {
            out.push((STDIN_MEMBER.to_owned(), path.clone()));
            continue;
        }
        if !path.exists() {
            tracing::warn!("skipping non-regular file: {}", path.display());
            continue;
        }
        if path.is_dir() && !opts.recursive {
            tracing::warn!("skipping directory: {}", path.display());
            continue;
        }
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(path).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            } else if !entry.file_type().is_dir() {
                tracing::warn!("skipping non-regular file: {}", entry.path().display());
            }
        }
        for file in files {
            out.push((member_name_for(&file, opts.flatten), file));
        }
    }
    Ok(out)
}

fn member_name_for(path: &Path, flatten: bool) -> String {
    let name = if flatten {
        path.file_name().map(Path::new).unwrap_or(path)
    } else {
        path
    };
    name.to_string_lossy().replace('\\', "/")
}

/// Contents of `path`, or all of standard input for `-`.
pub fn read_input(path: &Path) -> io::Result<Vec<u8>> {
    if is_stdio(path) {
        let mut buf = Vec::new();
        io::stdin().lock().read_to_end(&mut buf)?;
        return Ok(buf);
    }
    fs::read(path)
}

/// Read every input and write a BXPK archive to `output`, or to standard
/// output when it is `-`.  Returns the number of bytes packed.
pub fn pack_files<P: AsRef<Path>>(output: P, inputs: &[(String, PathBuf)]) -> io::Result<u64> {
    let output = output.as_ref();
    if is_stdio(output) {
        return pack_to(io::stdout().lock(), inputs);
    }
    pack_to(File::create(output)?, inputs)
}

/// Read every input and write a BXPK archive to `writer`.
pub fn pack_to<W: Write>(writer: W, inputs: &[(String, PathBuf)]) -> io::Result<u64> {
    let contents = inputs.iter()
        .map(|(_, path)| read_input(path))
        .collect::<io::Result<Vec<_>>>()?;
    let members: Vec<Member<'_>> = inputs.iter().zip(&contents)
        .map(|((name, _), data)| Member::new(name.as_str(), data))
        .collect();

    let mut writer = BufWriter::new(writer);
    bxpk::encode(&members, &mut writer)?;
    writer.flush()?;
    Ok(contents.iter().map(|c| c.len() as u64).sum())
}

// ── MemberFilter ──────────────────────────────────────────────────────────────

/// Include/exclude selection over member names with shell-style globs
/// (`*` and `?`).  Exclusion wins over inclusion; no include patterns
/// means everything is included.
#[derive(Debug, Clone, Default)]
pub struct MemberFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl MemberFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, regex::Error> {
        let compile = |ps: &[String]| ps.iter().map(|p| glob_to_regex(p)).collect::<Result<Vec<_>, _>>();
        Ok(Self { include: compile(include)?, exclude: compile(exclude)? })
    }

    pub fn matches(&self, name: &str) -> bool {
        (self.include.is_empty() || self.include.iter().any(|r| r.is_match(name)))
            && !self.exclude.iter().any(|r| r.is_match(name))
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c   => re.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re)
}

// ── ExtractOptions ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub destination: PathBuf,
    /// Strip directories from member names.
    pub flatten:     bool,
    /// Select members without writing anything.
    pub list_only:   bool,
    /// Write selected member contents to standard output instead of files.
    pub to_stdout:   bool,
    pub filter:      MemberFilter,
}

impl ExtractOptions {
    /// Defaults for `archive`: extract into `<archive>.d` next to it, or
    /// into the current directory when the archive comes from standard input.
    pub fn for_archive<P: AsRef<Path>>(archive: P) -> Self {
        let archive = archive.as_ref();
        let destination = if is_stdio(archive) {
            PathBuf::from(".")
        } else {
            let mut dir = archive.as_os_str().to_owned();
            dir.push(".d");
            PathBuf::from(dir)
        };
        Self {
            destination,
            flatten:     false,
            list_only:   false,
            to_stdout:   false,
            filter:      MemberFilter::default(),
        }
    }

    /// Where `name` would be written, or `None` if it has no usable path
    /// component.  `..`, `.` and empty components are dropped so a member
    /// can never land outside the destination.
    pub fn member_path(&self, name: &str) -> Option<PathBuf> {
        let parts: Vec<&str> = name.split(['/', '\\'])
            .filter(|p| !p.is_empty() && *p != "." && *p != "..")
            .collect();
        let parts = match (self.flatten, parts.last()) {
            (_, None)          => return None,
            (true, Some(last)) => vec![*last],
            (false, _)         => parts,
        };
        Some(parts.iter().fold(self.destination.clone(), |p, c| p.join(c)))
    }
}

/// What an unpack call selected and wrote.
#[derive(Debug, Clone, Default)]
pub struct ExtractReport {
    /// Names of members that passed the filter, in archive order.
    pub selected: Vec<String>,
    /// Files written, empty in list-only mode.
    pub written:  Vec<PathBuf>,
}

impl ExtractReport {
    fn handle(&mut self, opts: &ExtractOptions, name: &str, data: &[u8]) -> io::Result<()> {
        if !opts.filter.matches(name) {
            return Ok(());
        }
        self.selected.push(name.to_owned());
        if opts.list_only {
            return Ok(());
        }
        if opts.to_stdout {
            return io::stdout().lock().write_all(data);
        }
        let Some(path) = opts.member_path(name) else {
            tracing::warn!("member '{name}' has no usable path, not written");
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        tracing::debug!(bytes = data.len(), "wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

// ── Unpack ────────────────────────────────────────────────────────────────────

pub fn unpack_bxpk(buf: &[u8], opts: &ExtractOptions) -> Result<ExtractReport, ExtractError> {
    let mut report = ExtractReport::default();
    for member in bxpk::decode(buf)? {
        let member = member?;
        report.handle(opts, &member.name, member.data)?;
    }
    Ok(report)
}

/// Unpack a ZRES archive.  When it carries an export bundle, the textures
/// inside the export blob are written as well, under `TEX/<name>`.  Only the
/// texture records are decoded for this.
pub fn unpack_zres(
    buf:   &[u8],
    codec: &dyn Decompress,
    opts:  &ExtractOptions,
) -> Result<ExtractReport, ExtractError> {
    let mut report = ExtractReport::default();
    let mut members = zres::decode(buf, codec)?;
    for member in members.by_ref() {
        let member = member?;
        report.handle(opts, &member.name, member.data())?;
    }
    if let Some(bundle) = members.into_bundle() {
        for texture in bundle.textures()? {
            report.handle(opts, &texture.member_name(), texture.data)?;
        }
    }
    Ok(report)
}
