// Process-wide pool of reusable field arrays
//
// Every read session rents the array backing its current LineSlice from
// here and gives it back when the slice is dropped. Returning happens in
// `Drop`, so it occurs exactly once and a released array cannot be read
// through the slice that rented it.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

/// Where a finished field's characters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Range into the character source's current chunk (zero-copy)
    Direct,
    /// Range into the line builder's private storage
    Owned,
    Null,
}

/// A finalized field of the record being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    pub kind: FieldKind,
    pub start: usize,
    pub end: usize,
    pub quoted: bool,
}

impl FieldRef {
    pub const NULL: FieldRef = FieldRef {
        kind: FieldKind::Null,
        start: 0,
        end: 0,
        quoted: false,
    };

    /// An owned empty field, used to pad short records.
    pub const EMPTY: FieldRef = FieldRef {
        kind: FieldKind::Owned,
        start: 0,
        end: 0,
        quoted: false,
    };

    #[inline]
    pub fn is_empty_text(&self) -> bool {
        self.kind != FieldKind::Null && self.start == self.end
    }
}

/// Arrays kept for reuse; more than this are simply freed.
const MAX_POOLED: usize = 64;

/// Arrays larger than this are freed instead of pooled.
const MAX_POOLED_CAPACITY: usize = 4096;

static POOL: Mutex<Vec<Vec<FieldRef>>> = Mutex::new(Vec::new());

/// A rented field array. Goes back to the pool when dropped.
#[derive(Debug)]
pub struct PooledFields {
    fields: Vec<FieldRef>,
}

impl PooledFields {
    /// Rent an empty array with room for at least `capacity` fields.
    pub fn rent(capacity: usize) -> Self {
        let recycled = POOL
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        let mut fields = recycled.unwrap_or_default();
        fields.clear();
        fields.reserve(capacity);
        PooledFields { fields }
    }
}

impl Deref for PooledFields {
    type Target = Vec<FieldRef>;

    fn deref(&self) -> &Self::Target {
        &self.fields
    }
}

impl DerefMut for PooledFields {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.fields
    }
}

impl Drop for PooledFields {
    fn drop(&mut self) {
        let fields = std::mem::take(&mut self.fields);
        if fields.capacity() == 0 || fields.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        let mut pool = POOL.lock().unwrap_or_else(PoisonError::into_inner);
        if pool.len() < MAX_POOLED {
            pool.push(fields);
        }
    }
}

/// Number of arrays currently parked in the pool.
pub fn pooled_count() -> usize {
    POOL.lock().unwrap_or_else(PoisonError::into_inner).len()
}
