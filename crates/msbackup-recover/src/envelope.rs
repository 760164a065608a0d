//! Inscription envelopes in reveal transactions
//!
//! An inscription sits in a taproot script-path spend:
//!
//! ```text
//! OP_FALSE OP_IF "ord" <tag> <value> ... OP_0 <body push>... OP_ENDIF
//! ```
//!
//! Tag 1 is the content type; `OP_0` starts the body. Inscription `<txid>iN`
//! is the N-th envelope of the transaction, counting across inputs.

use std::str::FromStr;

use bitcoin::opcodes::all::{OP_ENDIF, OP_IF, OP_PUSHNUM_1, OP_PUSHNUM_16};
use bitcoin::script::Instruction;
use bitcoin::{Script, Transaction, Txid};

use crate::RecoverError;

const PROTOCOL_ID: &[u8] = b"ord";
const CONTENT_TYPE_TAG: &[u8] = &[1];

/// One parsed envelope
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    pub content_type: Option<Vec<u8>>,
    pub body: Vec<u8>,
}

impl Envelope {
    /// Body as UTF-8 when the content type is `text/plain`
    pub fn text(&self) -> Option<String> {
        let content_type = self.content_type.as_deref()?;
        if !content_type.starts_with(b"text/plain") {
            return None;
        }
        String::from_utf8(self.body.clone()).ok()
    }
}

/// Split `<txid>i<index>`
pub fn parse_inscription_id(id: &str) -> Result<(Txid, usize), RecoverError> {
    let invalid = || RecoverError::InvalidInscriptionId(id.to_string());
    let (txid, index) = id.rsplit_once('i').ok_or_else(invalid)?;
    let txid = Txid::from_str(txid).map_err(|_| invalid())?;
    let index = index.parse().map_err(|_| invalid())?;
    Ok((txid, index))
}

/// Every envelope in the transaction, in input order
pub fn envelopes(tx: &Transaction) -> Vec<Envelope> {
    tx.input
        .iter()
        .filter_map(|input| input.witness.tapscript())
        .flat_map(script_envelopes)
        .collect()
}

/// Decode a raw transaction and return the text body of envelope `index`
pub fn inscription_text(tx_hex: &str, index: usize) -> Result<Option<String>, RecoverError> {
    let bytes = hex::decode(tx_hex.trim())
        .map_err(|e| RecoverError::collaborator("transaction", format!("bad hex: {}", e)))?;
    let tx: Transaction = bitcoin::consensus::deserialize(&bytes)
        .map_err(|e| RecoverError::collaborator("transaction", e))?;
    Ok(envelopes(&tx).get(index).and_then(Envelope::text))
}

fn push_value(instruction: &Instruction<'_>) -> Option<Vec<u8>> {
    match instruction {
        Instruction::PushBytes(bytes) => Some(bytes.as_bytes().to_vec()),
        Instruction::Op(op) => {
            let code = op.to_u8();
            if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&code) {
                Some(vec![code - OP_PUSHNUM_1.to_u8() + 1])
            } else {
                None
            }
        }
    }
}

fn script_envelopes(script: &Script) -> Vec<Envelope> {
    let instructions = match script.instructions().collect::<Result<Vec<_>, _>>() {
        Ok(instructions) => instructions,
        Err(_) => return Vec::new(),
    };

    let mut found = Vec::new();
    let mut i = 0;
    while i + 2 < instructions.len() {
        let is_start = matches!(&instructions[i], Instruction::PushBytes(b) if b.as_bytes().is_empty())
            && instructions[i + 1] == Instruction::Op(OP_IF)
            && matches!(&instructions[i + 2], Instruction::PushBytes(b) if b.as_bytes() == PROTOCOL_ID);
        if !is_start {
            i += 1;
            continue;
        }
        match parse_fields(&instructions[i + 3..]) {
            Some((envelope, consumed)) => {
                found.push(envelope);
                i += 3 + consumed;
            }
            None => break,
        }
    }
    found
}

/// Parse tag/value pairs and the body up to `OP_ENDIF`. Returns the envelope
/// and the number of instructions consumed.
fn parse_fields(instructions: &[Instruction<'_>]) -> Option<(Envelope, usize)> {
    let mut envelope = Envelope::default();
    let mut i = 0;
    loop {
        let instruction = instructions.get(i)?;
        if *instruction == Instruction::Op(OP_ENDIF) {
            return Some((envelope, i + 1));
        }
        let tag = push_value(instruction)?;
        if tag.is_empty() {
            i += 1;
            loop {
                let instruction = instructions.get(i)?;
                if *instruction == Instruction::Op(OP_ENDIF) {
                    return Some((envelope, i + 1));
                }
                envelope.body.extend(push_value(instruction)?);
                i += 1;
            }
        }
        let value = push_value(instructions.get(i + 1)?)?;
        if tag == CONTENT_TYPE_TAG && envelope.content_type.is_none() {
            envelope.content_type = Some(value);
        }
        i += 2;
    }
}
