#![forbid(unsafe_code)]
//! Vertex identifiers and edge records shared by every layer.

use core::cmp::Ordering;
use core::fmt::{Debug, Display};
use core::hash::Hash;
use core::str::FromStr;

use crate::codec::{Cursor, Wire};
use crate::error::Result;

/// Numeric vertex identifier. Identity and ordering come from the number alone.
pub trait VertexId:
    Copy + Ord + Hash + Debug + Display + FromStr + Send + Sync + Wire + 'static
{
    /// Widens the id for hashing and arithmetic.
    fn to_i64(self) -> i64;
    /// Narrows an enumerated id back to the native width.
    fn from_i64(raw: i64) -> Self;
}

macro_rules! vertex_id {
    ($($ty:ty),* $(,)?) => {
        $(
            impl VertexId for $ty {
                #[inline]
                fn to_i64(self) -> i64 {
                    self as i64
                }

                #[inline]
                fn from_i64(raw: i64) -> Self {
                    raw as $ty
                }
            }
        )*
    };
}

vertex_id!(i32, i64, u32, u64);

/// Edge id placeholder before the loader assigns final ids.
pub const UNASSIGNED_EDGE: i64 = -1;

/// A directed edge. Ordering is lexicographic on `(src, dst, id)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Edge<V> {
    /// Cluster-unique id, or [`UNASSIGNED_EDGE`].
    pub id: i64,
    /// Source vertex.
    pub src: V,
    /// Destination vertex.
    pub dst: V,
}

impl<V: VertexId> Edge<V> {
    /// Creates an edge record.
    pub fn new(id: i64, src: V, dst: V) -> Self {
        Self { id, src, dst }
    }

    /// The same edge seen from the destination.
    pub fn reversed(&self) -> Self {
        Self {
            id: self.id,
            src: self.dst,
            dst: self.src,
        }
    }

    /// Copy with a new id.
    pub fn with_id(&self, id: i64) -> Self {
        Self { id, ..*self }
    }
}

impl<V: Ord> Ord for Edge<V> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.src
            .cmp(&other.src)
            .then_with(|| self.dst.cmp(&other.dst))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl<V: Ord> PartialOrd for Edge<V> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<V: VertexId> Wire for Edge<V> {
    fn encode(&self, out: &mut Vec<u8>) {
        self.id.encode(out);
        self.src.encode(out);
        self.dst.encode(out);
    }

    fn decode(cur: &mut Cursor<'_>) -> Result<Self> {
        Ok(Self {
            id: i64::decode(cur)?,
            src: V::decode(cur)?,
            dst: V::decode(cur)?,
        })
    }
}

/// Neighbour direction for degree and adjacency queries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Edges pointing at the vertex.
    In,
    /// Edges leaving the vertex.
    Out,
    /// Both, in-neighbours first.
    Both,
}
