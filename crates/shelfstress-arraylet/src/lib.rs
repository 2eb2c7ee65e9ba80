//! [`Arraylet<T>`] — a fixed-length ordered sequence that fans out into
//! bounded-size chunks so no single contiguous allocation exceeds a
//! configured ceiling.
//!
//! With `chunk_len == 0` this degenerates to one contiguous `Vec<T>`. With a
//! non-zero `chunk_len` (minimum 4), it builds a shallow tree: leaves hold up
//! to `chunk_len` elements, internal nodes hold up to `chunk_len` children,
//! and `get`/`set` locate a slot by integer division/remainder against each
//! level's span, exactly mirroring how the tree was built bottom-up.

use thiserror::Error;

/// Errors constructing or indexing an [`Arraylet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArrayletError {
    /// `chunk_len` was non-zero but below the minimum of 4.
    #[error("chunk length {requested} is below the minimum of 4 (use 0 to disable chunking)")]
    ChunkTooSmall {
        /// The rejected chunk length.
        requested: usize,
    },
    /// Index was not in `0..len`.
    #[error("index {index} out of bounds for arraylet of length {len}")]
    OutOfBounds {
        /// The offending index.
        index: usize,
        /// The arraylet's logical length.
        len: usize,
    },
}

#[derive(Debug, Clone)]
enum Node<T> {
    Leaf(Vec<T>),
    Internal { children: Vec<Node<T>>, child_span: usize },
}

impl<T> Node<T> {
    fn get(&self, i: usize) -> &T {
        match self {
            Node::Leaf(v) => &v[i],
            Node::Internal { children, child_span } => {
                let child_idx = i / child_span;
                children[child_idx].get(i % child_span)
            }
        }
    }

    fn get_mut(&mut self, i: usize) -> &mut T {
        match self {
            Node::Leaf(v) => &mut v[i],
            Node::Internal { children, child_span } => {
                let child_span = *child_span;
                let child_idx = i / child_span;
                children[child_idx].get_mut(i % child_span)
            }
        }
    }
}

/// Either a flat `Vec<T>` (no chunking) or a chunked fan-out tree.
#[derive(Debug, Clone)]
enum Storage<T> {
    Flat(Vec<T>),
    Tree(Node<T>),
}

/// A fixed-length ordered sequence of `T`, internally chunked per [`Arraylet::new`].
#[derive(Debug, Clone)]
pub struct Arraylet<T> {
    len: usize,
    chunk_len: usize,
    storage: Storage<T>,
}

fn ceil_div(a: usize, b: usize) -> usize {
    if a == 0 {
        0
    } else {
        (a - 1) / b + 1
    }
}

impl<T: Clone + Default> Arraylet<T> {
    /// Builds a new arraylet of logical length `len`, chunked to `chunk_len`
    /// (0 disables chunking; otherwise must be >= 4). Every slot starts at
    /// `T::default()`.
    pub fn new(chunk_len: usize, len: usize) -> Result<Self, ArrayletError> {
        if chunk_len != 0 && chunk_len < 4 {
            return Err(ArrayletError::ChunkTooSmall { requested: chunk_len });
        }

        let storage = if chunk_len == 0 {
            Storage::Flat(vec![T::default(); len])
        } else {
            Storage::Tree(Self::build_tree(chunk_len, len))
        };

        Ok(Self { len, chunk_len, storage })
    }

    fn build_tree(chunk_len: usize, len: usize) -> Node<T> {
        if len == 0 {
            return Node::Leaf(Vec::new());
        }

        let num_leaves = ceil_div(len, chunk_len);
        let mut level: Vec<Node<T>> = (0..num_leaves)
            .map(|leaf_idx| {
                let start = leaf_idx * chunk_len;
                let leaf_len = chunk_len.min(len - start);
                Node::Leaf(vec![T::default(); leaf_len])
            })
            .collect();

        let mut span = chunk_len;
        while level.len() > 1 {
            let mut next = Vec::with_capacity(ceil_div(level.len(), chunk_len));
            let mut drain = level.into_iter().peekable();
            while drain.peek().is_some() {
                let children: Vec<Node<T>> = (&mut drain).take(chunk_len).collect();
                next.push(Node::Internal { children, child_span: span });
            }
            level = next;
            span = span.saturating_mul(chunk_len);
        }

        level.into_iter().next().unwrap_or_else(|| Node::Leaf(Vec::new()))
    }

    /// The logical length of the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the sequence has zero logical length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The chunk ceiling this arraylet was constructed with (0 = unchunked).
    #[must_use]
    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    fn check_bounds(&self, i: usize) -> Result<(), ArrayletError> {
        if i >= self.len {
            Err(ArrayletError::OutOfBounds { index: i, len: self.len })
        } else {
            Ok(())
        }
    }

    /// Reads the element at index `i`.
    pub fn get(&self, i: usize) -> Result<&T, ArrayletError> {
        self.check_bounds(i)?;
        Ok(match &self.storage {
            Storage::Flat(v) => &v[i],
            Storage::Tree(root) => root.get(i),
        })
    }

    /// Writes `v` at index `i`.
    pub fn set(&mut self, i: usize, v: T) -> Result<(), ArrayletError> {
        self.check_bounds(i)?;
        match &mut self.storage {
            Storage::Flat(vec) => vec[i] = v,
            Storage::Tree(root) => *root.get_mut(i) = v,
        }
        Ok(())
    }
}
