//! Binary layout of an encrypted backup
//!
//! ```text
//! [sealed shares, group 0][sealed shares, group 1]...
//! [encrypted payload: 4 * total_xfps + 74 * total_xpubs]
//! [pair hashes: 4 each, optional]
//! ```
//!
//! Nothing is length-prefixed. Every width follows from the slot counts of
//! the stripped template, so the template is parsed before the bytes are
//! sliced.

use msbackup_core::bytes::to_base64;
use msbackup_core::keys::all_pair_hashes;
use msbackup_core::{split_encrypted, Descriptor, DescriptorError};

use crate::payload::payload_len;
use crate::share::ShareKind;
use crate::BackupError;

/// Lookup hash for a fingerprint pair
pub type PairHash = [u8; 4];

/// Sealed shares of one multisig group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupShares {
    pub required_sigs: usize,
    pub kind: ShareKind,
    pub sealed: Vec<Vec<u8>>,
}

/// Everything after the stripped template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub groups: Vec<GroupShares>,
    pub payload: Vec<u8>,
    pub pair_hashes: Option<Vec<PairHash>>,
}

/// Number of pair hashes written for a descriptor: every unique fingerprint
/// pair within each group.
pub fn expected_pair_hashes(template: &Descriptor) -> usize {
    template
        .groups()
        .iter()
        .map(|g| g.num_xfps * g.num_xfps.saturating_sub(1) / 2)
        .sum()
}

/// Pair hashes of a keyed descriptor, group by group
pub fn pair_hashes_for(descriptor: &Descriptor) -> Vec<PairHash> {
    descriptor
        .groups()
        .iter()
        .flat_map(|g| all_pair_hashes(&g.fingerprints))
        .collect()
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], DescriptorError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.data.len());
        let end = end.ok_or_else(|| {
            DescriptorError::InvalidEncryptedText(format!(
                "{} needs {} bytes at offset {}, only {} left",
                what,
                len,
                self.pos,
                self.data.len() - self.pos
            ))
        })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

impl EncryptedBlob {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for group in &self.groups {
            for sealed in &group.sealed {
                out.extend_from_slice(sealed);
            }
        }
        out.extend_from_slice(&self.payload);
        for hash in self.pair_hashes.iter().flatten() {
            out.extend_from_slice(hash);
        }
        out
    }

    /// Slice `data` according to the slot counts of `template`
    pub fn unpack(template: &Descriptor, data: &[u8]) -> Result<Self, BackupError> {
        let mut reader = Reader::new(data);

        let mut groups = Vec::with_capacity(template.groups().len());
        for (n, group) in template.groups().iter().enumerate() {
            if group.num_xpubs == 0 || group.required_sigs > group.num_xpubs {
                return Err(DescriptorError::InvalidEncryptedText(format!(
                    "group {} requires {} of {} keys",
                    n, group.required_sigs, group.num_xpubs
                ))
                .into());
            }
            let kind = ShareKind::for_group(group.num_xpubs, group.required_sigs);
            let sealed = (0..group.num_xpubs)
                .map(|_| reader.take(kind.sealed_len(), "share").map(<[u8]>::to_vec))
                .collect::<Result<Vec<_>, _>>()?;
            groups.push(GroupShares {
                required_sigs: group.required_sigs,
                kind,
                sealed,
            });
        }

        let payload = reader
            .take(
                payload_len(template.total_fingerprints(), template.total_xpubs()),
                "payload",
            )?
            .to_vec();

        let pair_hashes = match reader.remaining() {
            0 => None,
            _ => {
                let expected = expected_pair_hashes(template);
                let bytes = reader.take(4 * expected, "pair hashes")?;
                if reader.remaining() != 0 {
                    return Err(DescriptorError::InvalidEncryptedText(format!(
                        "{} unexpected trailing bytes",
                        reader.remaining()
                    ))
                    .into());
                }
                Some(
                    bytes
                        .chunks_exact(4)
                        .map(|c| [c[0], c[1], c[2], c[3]])
                        .collect(),
                )
            }
        };

        Ok(Self {
            groups,
            payload,
            pair_hashes,
        })
    }
}

/// A parsed encrypted text: the template, its stripped rendering and the blob
#[derive(Debug, Clone)]
pub struct EncryptedDescriptor {
    template: Descriptor,
    stripped: String,
    blob: EncryptedBlob,
}

impl EncryptedDescriptor {
    pub fn parse(text: &str) -> Result<Self, BackupError> {
        let (stripped, data) = split_encrypted(text)?;
        let template = Descriptor::parse_stripped(stripped)?;
        let blob = EncryptedBlob::unpack(&template, &data)?;
        Ok(Self {
            template,
            stripped: stripped.to_string(),
            blob,
        })
    }

    pub(crate) fn new(template: Descriptor, blob: EncryptedBlob) -> Self {
        Self {
            stripped: template.stripped(),
            template,
            blob,
        }
    }

    pub fn template(&self) -> &Descriptor {
        &self.template
    }

    pub fn stripped(&self) -> &str {
        &self.stripped
    }

    pub fn blob(&self) -> &EncryptedBlob {
        &self.blob
    }

    pub fn total_fingerprints(&self) -> usize {
        self.template.total_fingerprints()
    }

    pub fn total_xpubs(&self) -> usize {
        self.template.total_xpubs()
    }

    /// Largest threshold across groups; the number of xpubs a recovery asks
    /// for up front.
    pub fn max_required_sigs(&self) -> usize {
        self.blob
            .groups
            .iter()
            .map(|g| g.required_sigs)
            .max()
            .unwrap_or(0)
    }

    pub fn suggested_origin_path(&self) -> Option<String> {
        self.template.suggested_origin_path()
    }

    /// Render as publishable text: template then unpadded Base64
    pub fn to_text(&self) -> String {
        format!("{}{}", self.stripped, to_base64(&self.blob.to_bytes()))
    }
}

/// Parse encrypted text into template counts and sliced binary sections
pub fn parse_encrypted_descriptor(text: &str) -> Result<EncryptedDescriptor, BackupError> {
    EncryptedDescriptor::parse(text)
}
