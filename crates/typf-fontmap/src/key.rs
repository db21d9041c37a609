//! Font faces and the keys that identify a scaled font
//!
//! A [`FontKey`] is the full identity of a realized font: which face, at
//! which font matrix, under which device transform, with which options.
//! Translation never matters for glyph shapes, so the device transform is
//! stored with its translation stripped and two requests that differ only in
//! where the text lands map to the same font.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{FontMapError, Result};
use crate::matrix::Matrix;
use crate::options::FontOptions;
use crate::traits::FontBackend;

static NEXT_FACE_ID: AtomicU64 = AtomicU64::new(1);

struct FaceInner {
    id: u64,
    family: String,
    backend: Arc<dyn FontBackend>,
}

/// An unscaled font face plus the backend that knows how to realize it
///
/// Cloning is cheap and keeps the identity: clones compare equal, while two
/// separately created faces never do, even with the same family name.
#[derive(Clone)]
pub struct FontFace {
    inner: Arc<FaceInner>,
}

impl FontFace {
    pub fn new(family: impl Into<String>, backend: Arc<dyn FontBackend>) -> Self {
        Self {
            inner: Arc::new(FaceInner {
                id: NEXT_FACE_ID.fetch_add(1, Ordering::Relaxed),
                family: family.into(),
                backend,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn family(&self) -> &str {
        &self.inner.family
    }

    pub fn backend(&self) -> &Arc<dyn FontBackend> {
        &self.inner.backend
    }
}

impl PartialEq for FontFace {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for FontFace {}

impl Hash for FontFace {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for FontFace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FontFace")
            .field("id", &self.inner.id)
            .field("family", &self.inner.family)
            .field("backend", &self.inner.backend.name())
            .finish()
    }
}

/// Identity of a scaled font
#[derive(Debug, Clone)]
pub struct FontKey {
    face: FontFace,
    font_matrix: Matrix,
    ctm: Matrix,
    options: FontOptions,
}

impl FontKey {
    /// Build a key, rejecting matrices no font could be realized at
    ///
    /// Singular matrices are allowed (a font size of 0 is legal); only a
    /// non-finite determinant is refused.
    pub fn new(
        face: FontFace,
        font_matrix: Matrix,
        ctm: Matrix,
        options: FontOptions,
    ) -> Result<Self> {
        if !font_matrix.determinant().is_finite() {
            return Err(FontMapError::InvalidMatrix("font matrix"));
        }
        if !ctm.determinant().is_finite() {
            return Err(FontMapError::InvalidMatrix("device transform"));
        }
        options.validate()?;

        Ok(Self {
            face,
            font_matrix,
            ctm: ctm.without_translation(),
            options,
        })
    }

    pub fn face(&self) -> &FontFace {
        &self.face
    }

    pub fn font_matrix(&self) -> &Matrix {
        &self.font_matrix
    }

    /// Device transform, translation already zeroed
    pub fn ctm(&self) -> &Matrix {
        &self.ctm
    }

    pub fn options(&self) -> &FontOptions {
        &self.options
    }
}

impl PartialEq for FontKey {
    fn eq(&self, other: &Self) -> bool {
        self.face == other.face
            && self.font_matrix.identity_bits() == other.font_matrix.identity_bits()
            && self.ctm.identity_bits() == other.ctm.identity_bits()
            && self.options == other.options
    }
}

impl Eq for FontKey {}

impl Hash for FontKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.face.hash(state);
        self.font_matrix.identity_bits().hash(state);
        self.ctm.identity_bits().hash(state);
        self.options.hash(state);
    }
}
