//! Descriptor parser and codec
//!
//! A descriptor is scanned once into a template: literal text interleaved
//! with fingerprint slots and key slots. Stripping renders the template with
//! every slot empty; reinsertion renders it with slots filled in order. Both
//! directions walk the same template, so a stripped descriptor always parses
//! back to the same slot layout.
//!
//! Only keys inside `multi(..)`, `sortedmulti(..)`, `multi_a(..)` and
//! `sortedmulti_a(..)` clauses become slots. Key expressions that are not
//! extended public keys (raw hex keys, tokens with a bad checksum) stay in
//! the template as literal text.

use thiserror::Error;

use crate::bytes::{from_base64, is_base64_char};
use crate::checksum::split_checksum;
use crate::keys::{
    fingerprint_to_hex, looks_like_private_key, looks_like_public_key, parse_fingerprint,
    ExtendedKey, Fingerprint, KeyError,
};
use crate::path::{is_key_suffix, is_origin_path, suggest_origin_path};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Invalid multisig descriptor. Must contain \"[sorted]multi[_a](...)\"")]
    MissingMultisig,
    #[error("Invalid descriptor format: {0}")]
    MalformedClause(String),
    #[error("Invalid key expression '{0}'")]
    MalformedKey(String),
    #[error("Taproot descriptors not supported yet")]
    Taproot { internal_key: Option<String> },
    #[error("Descriptor contains an extended private key")]
    PrivateKey,
    #[error("Invalid encrypted text: {0}")]
    InvalidEncryptedText(String),
    #[error(transparent)]
    Key(#[from] KeyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Full descriptor with fingerprints and xpubs present
    Keyed,
    /// Template produced by [`Descriptor::stripped`]
    Stripped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Piece {
    Text(String),
    /// Fingerprint position inside `[...]`; `separator` when an origin path follows
    Fingerprint { separator: bool },
    /// Key position; `separator` when a derivation suffix follows
    Key { separator: bool },
}

/// One multisig clause.
///
/// `fingerprints` and `xpubs` are only populated for a keyed descriptor; a
/// stripped template carries the counts alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultisigGroup {
    pub required_sigs: usize,
    pub fingerprints: Vec<Fingerprint>,
    pub xpubs: Vec<ExtendedKey>,
    pub num_xfps: usize,
    pub num_xpubs: usize,
}

impl MultisigGroup {
    fn new(required_sigs: usize) -> Self {
        Self {
            required_sigs,
            fingerprints: Vec::new(),
            xpubs: Vec::new(),
            num_xfps: 0,
            num_xpubs: 0,
        }
    }
}

/// A parsed descriptor template and its multisig groups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pieces: Vec<Piece>,
    groups: Vec<MultisigGroup>,
    origin_paths: Vec<String>,
}

impl Descriptor {
    /// Parse a full descriptor. Any `#checksum` suffix is ignored.
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        Scanner::new(Mode::Keyed).run(text)
    }

    /// Parse a stripped template, recovering slot counts only
    pub fn parse_stripped(text: &str) -> Result<Self, DescriptorError> {
        Scanner::new(Mode::Stripped).run(text)
    }

    pub fn groups(&self) -> &[MultisigGroup] {
        &self.groups
    }

    pub fn total_fingerprints(&self) -> usize {
        self.groups.iter().map(|g| g.num_xfps).sum()
    }

    pub fn total_xpubs(&self) -> usize {
        self.groups.iter().map(|g| g.num_xpubs).sum()
    }

    /// All fingerprints, in group order
    pub fn fingerprints(&self) -> impl Iterator<Item = &Fingerprint> {
        self.groups.iter().flat_map(|g| g.fingerprints.iter())
    }

    /// All extended keys, in group order
    pub fn xpubs(&self) -> impl Iterator<Item = &ExtendedKey> {
        self.groups.iter().flat_map(|g| g.xpubs.iter())
    }

    /// True when some key has no recorded fingerprint
    pub fn missing_fingerprints(&self) -> bool {
        self.total_fingerprints() < self.total_xpubs()
    }

    /// Key origin paths (after the fingerprint), in text order
    pub fn origin_paths(&self) -> &[String] {
        &self.origin_paths
    }

    /// The origin path shared by every standard-purpose key, if there is one
    pub fn suggested_origin_path(&self) -> Option<String> {
        suggest_origin_path(self.origin_paths.iter().map(String::as_str))
    }

    /// Render the template with every fingerprint and key removed
    pub fn stripped(&self) -> String {
        self.reinsert::<&str>(&[], &[])
    }

    /// Render the template, filling fingerprint and key slots in order.
    ///
    /// Slots left over once a list runs out stay empty, so a descriptor with
    /// fewer known fingerprints than holes still renders.
    pub fn reinsert<S: AsRef<str>>(&self, fingerprints: &[Fingerprint], xpubs: &[S]) -> String {
        let mut out = String::new();
        let mut fingerprints = fingerprints.iter();
        let mut xpubs = xpubs.iter();
        for piece in &self.pieces {
            match piece {
                Piece::Text(text) => out.push_str(text),
                Piece::Fingerprint { separator } => {
                    if let Some(fp) = fingerprints.next() {
                        out.push_str(&fingerprint_to_hex(fp));
                        if *separator {
                            out.push('/');
                        }
                    }
                }
                Piece::Key { separator } => {
                    if let Some(xpub) = xpubs.next() {
                        out.push_str(xpub.as_ref());
                        if *separator {
                            out.push('/');
                        }
                    }
                }
            }
        }
        out
    }

    /// Render a keyed descriptor back to text (without checksum)
    pub fn to_descriptor_string(&self) -> String {
        let fingerprints: Vec<Fingerprint> = self.fingerprints().copied().collect();
        let xpubs: Vec<String> = self.xpubs().map(ExtendedKey::to_base58).collect();
        self.reinsert(&fingerprints, &xpubs)
    }
}

/// Strip every fingerprint, key and checksum from a descriptor
pub fn strip_descriptor(text: &str) -> Result<String, DescriptorError> {
    Ok(Descriptor::parse(text)?.stripped())
}

/// Split encrypted text into its stripped template and decoded binary tail.
///
/// The template always ends in `)` and Base64 never contains one, so the
/// boundary is the last `)`.
pub fn split_encrypted(text: &str) -> Result<(&str, Vec<u8>), DescriptorError> {
    let text = text.trim();
    let boundary = text
        .rfind(')')
        .ok_or_else(|| DescriptorError::InvalidEncryptedText("no descriptor template".into()))?;
    let (template, tail) = text.split_at(boundary + 1);
    let tail = tail.trim_end_matches('=');
    if tail.is_empty() {
        return Err(DescriptorError::InvalidEncryptedText("missing Base64 payload".into()));
    }
    if !tail.chars().all(is_base64_char) {
        return Err(DescriptorError::InvalidEncryptedText(
            "payload is not Base64".into(),
        ));
    }
    let data = from_base64(tail).map_err(|e| DescriptorError::InvalidEncryptedText(e.to_string()))?;
    Ok((template, data))
}

struct Scanner {
    mode: Mode,
    pieces: Vec<Piece>,
    groups: Vec<MultisigGroup>,
    origin_paths: Vec<String>,
}

impl Scanner {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            pieces: Vec::new(),
            groups: Vec::new(),
            origin_paths: Vec::new(),
        }
    }

    fn run(mut self, text: &str) -> Result<Descriptor, DescriptorError> {
        let (body, _) = split_checksum(text);
        reject_taproot(body)?;

        let mut rest = body;
        while let Some((start, len)) = find_clause(rest)? {
            self.text(&rest[..start]);
            self.clause(&rest[start..start + len])?;
            rest = &rest[start + len..];
        }
        self.text(rest);

        if self.groups.is_empty() {
            return Err(DescriptorError::MissingMultisig);
        }
        log::debug!(
            "Parsed {} multisig group(s): {:?}",
            self.groups.len(),
            self.groups
                .iter()
                .map(|g| (g.required_sigs, g.num_xpubs))
                .collect::<Vec<_>>()
        );
        Ok(Descriptor {
            pieces: self.pieces,
            groups: self.groups,
            origin_paths: self.origin_paths,
        })
    }

    fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.pieces.last_mut() {
            Some(Piece::Text(last)) => last.push_str(text),
            _ => self.pieces.push(Piece::Text(text.to_string())),
        }
    }

    /// Arguments of one clause, between its parentheses
    fn clause(&mut self, args: &str) -> Result<(), DescriptorError> {
        let mut args = args.split(',');
        let threshold = args.next().unwrap_or_default();
        let required_sigs = parse_threshold(threshold)?;
        self.text(threshold);

        let mut group = MultisigGroup::new(required_sigs);
        let mut num_args = 0;
        for arg in args {
            num_args += 1;
            self.text(",");
            self.key(arg, &mut group)?;
        }
        if num_args == 0 {
            return Err(DescriptorError::MalformedClause(
                "multisig clause has no keys".into(),
            ));
        }
        self.groups.push(group);
        Ok(())
    }

    fn key(&mut self, arg: &str, group: &mut MultisigGroup) -> Result<(), DescriptorError> {
        let (origin, body) = split_origin(arg)?;
        match self.mode {
            Mode::Keyed => self.keyed_key(arg, origin, body, group),
            Mode::Stripped => {
                if is_hole(origin, body) {
                    if let Some(path) = origin {
                        self.fingerprint_slot(path, group);
                    }
                    self.key_slot(body, group);
                } else {
                    self.text(arg);
                }
                Ok(())
            }
        }
    }

    fn keyed_key(
        &mut self,
        arg: &str,
        origin: Option<&str>,
        body: &str,
        group: &mut MultisigGroup,
    ) -> Result<(), DescriptorError> {
        let (token, suffix) = match body.split_once('/') {
            Some((token, suffix)) => (token, Some(suffix)),
            None => (body, None),
        };
        if looks_like_private_key(token) {
            return Err(DescriptorError::PrivateKey);
        }

        let xpub = match looks_like_public_key(token).then(|| ExtendedKey::from_base58(token)) {
            Some(Ok(xpub)) => xpub,
            _ => {
                // A literal that reads as an empty slot would shift every
                // slot after it once stripped.
                if is_hole(origin, body) {
                    return Err(DescriptorError::MalformedKey(arg.to_string()));
                }
                log::debug!("Keeping non-xpub key expression as literal text");
                self.text(arg);
                return Ok(());
            }
        };

        if let Some(suffix) = suffix {
            if !is_key_suffix(suffix) {
                return Err(DescriptorError::MalformedKey(arg.to_string()));
            }
        }
        if let Some(origin) = origin {
            let (fp_hex, path) = match origin.split_once('/') {
                Some((fp_hex, path)) if is_origin_path(path) => (fp_hex, path),
                Some(_) => return Err(DescriptorError::MalformedKey(arg.to_string())),
                None => (origin, ""),
            };
            let fp = parse_fingerprint(fp_hex)?;
            self.fingerprint_slot(path, group);
            group.fingerprints.push(fp);
        }
        self.key_slot(suffix.unwrap_or_default(), group);
        group.xpubs.push(xpub);
        Ok(())
    }

    /// `[` fingerprint `/path]`
    fn fingerprint_slot(&mut self, path: &str, group: &mut MultisigGroup) {
        self.text("[");
        self.pieces.push(Piece::Fingerprint {
            separator: !path.is_empty(),
        });
        self.text(path);
        self.text("]");
        if !path.is_empty() {
            self.origin_paths.push(path.to_string());
        }
        group.num_xfps += 1;
    }

    fn key_slot(&mut self, suffix: &str, group: &mut MultisigGroup) {
        self.pieces.push(Piece::Key {
            separator: !suffix.is_empty(),
        });
        self.text(suffix);
        group.num_xpubs += 1;
    }
}

/// True if a key argument reads as an emptied slot: an optional origin
/// holding only a path, then nothing or a derivation suffix.
fn is_hole(origin: Option<&str>, body: &str) -> bool {
    let origin_ok = origin.map_or(true, |o| o.is_empty() || is_origin_path(o));
    origin_ok && (body.is_empty() || is_key_suffix(body))
}

fn split_origin(arg: &str) -> Result<(Option<&str>, &str), DescriptorError> {
    match arg.strip_prefix('[') {
        Some(inner) => {
            let (origin, body) = inner
                .split_once(']')
                .ok_or_else(|| DescriptorError::MalformedKey(arg.to_string()))?;
            Ok((Some(origin), body))
        }
        None => Ok((None, arg)),
    }
}

fn parse_threshold(s: &str) -> Result<usize, DescriptorError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DescriptorError::MalformedClause(format!(
            "threshold '{}' is not a number",
            s
        )));
    }
    match s.parse::<usize>() {
        Ok(0) => Err(DescriptorError::MalformedClause(
            "threshold must be at least 1".into(),
        )),
        Ok(k) => Ok(k),
        Err(e) => Err(DescriptorError::MalformedClause(e.to_string())),
    }
}

/// Locate the next multisig clause. Returns the offset and length of its
/// argument list.
fn find_clause(s: &str) -> Result<Option<(usize, usize)>, DescriptorError> {
    const NAME: &str = "multi";
    let mut from = 0;
    while let Some(pos) = s[from..].find(NAME) {
        let after = from + pos + NAME.len();
        let tail = &s[after..];
        let open = if tail.starts_with('(') {
            Some(1)
        } else if tail.starts_with("_a(") {
            Some(3)
        } else {
            None
        };
        if let Some(open) = open {
            let start = after + open;
            let len = s[start..].find(')').ok_or_else(|| {
                DescriptorError::MalformedClause("unterminated multisig clause".into())
            })?;
            return Ok(Some((start, len)));
        }
        from = after;
    }
    Ok(None)
}

/// Reject `tr(...)`, capturing the internal key when it is an extended key
fn reject_taproot(body: &str) -> Result<(), DescriptorError> {
    let mut from = 0;
    while let Some(pos) = body[from..].find("tr(") {
        let at = from + pos;
        let at_boundary = body[..at]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_ascii_alphanumeric() && c != '_');
        if at_boundary {
            let args = &body[at + 3..];
            let end = args.find([',', ')']).unwrap_or(args.len());
            let expr = &args[..end];
            let key = expr.rsplit(']').next().unwrap_or(expr);
            let token = key.split('/').next().unwrap_or(key);
            let internal_key = looks_like_public_key(token).then(|| token.to_string());
            return Err(DescriptorError::Taproot { internal_key });
        }
        from = at + 3;
    }
    Ok(())
}
