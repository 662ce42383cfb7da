//! Workflow composition: chain / group / chord.
//!
//! These only shape the signature graph (continuations, group fields,
//! chord callbacks). Running it is the worker's job.

use serde::{Deserialize, Serialize};

use super::copy::copy_signature;
use super::errors::SignatureError;
use super::ids::GroupId;
use super::signature::Signature;
use crate::ports::id_generator::IdGenerator;

/// Link signatures so each one runs after its predecessor succeeds.
///
/// Returns the head of the chain; every other signature is nested as the
/// last `on_success` continuation of the one before it.
pub fn chain(signatures: Vec<Signature>) -> Result<Signature, SignatureError> {
    let mut rest = signatures.into_iter().rev();
    let mut tail = rest.next().ok_or(SignatureError::EmptyWorkflow("chain"))?;
    for mut previous in rest {
        previous.on_success.push(tail);
        tail = previous;
    }
    Ok(tail)
}

/// Signatures that run in parallel and share a group id.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub group_id: GroupId,
    pub signatures: Vec<Signature>,
}

impl Group {
    /// Stamp every member with a fresh group id and the member count.
    pub fn new<G: IdGenerator + ?Sized>(
        ids: &G,
        mut signatures: Vec<Signature>,
    ) -> Result<Self, SignatureError> {
        if signatures.is_empty() {
            return Err(SignatureError::EmptyWorkflow("group"));
        }
        let count = member_count(signatures.len())?;
        let group_id = ids.generate_group_id()?;
        for signature in &mut signatures {
            signature.group_id = Some(group_id.clone());
            signature.group_task_count = Some(count);
        }
        Ok(Self {
            group_id,
            signatures,
        })
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn into_signatures(self) -> Vec<Signature> {
        self.signatures
    }
}

/// `group_task_count` is a `u32`; a larger group cannot be stamped.
fn member_count(len: usize) -> Result<u32, SignatureError> {
    u32::try_from(len).map_err(|_| SignatureError::GroupTooLarge(len))
}

/// A group plus the callback fired once all of its members complete.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Chord {
    pub group: Group,
    pub callback: Signature,
}

impl Chord {
    /// Give every member its own copy of `callback` as chord callback.
    pub fn new(mut group: Group, callback: Signature) -> Result<Self, SignatureError> {
        for member in &mut group.signatures {
            member.chord_callback = Some(Box::new(copy_signature(&callback)?));
        }
        Ok(Self { group, callback })
    }
}
