//! Offscreen depth-32 textures

use super::{Buffer, Point, Rect, Shared, Size, UploadRecipient};
use crate::backend::Xid;
use crate::error::Result;
use std::sync::Arc;

/// A pixmap with a RENDER picture bound to it
pub struct Texture {
    shared: Arc<Shared>,
    size: Size,
    pixmap: Xid,
    picture: Xid,
}

impl Texture {
    pub(crate) fn new(shared: Arc<Shared>, size: Size, pixmap: Xid, picture: Xid) -> Self {
        Texture {
            shared,
            size,
            pixmap,
            picture,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn pixmap(&self) -> Xid {
        self.pixmap
    }

    pub fn picture(&self) -> Xid {
        self.picture
    }

    /// Copy `src` from `buffer` into the texture at `dst`
    pub fn upload(
        &self,
        buffer: &Buffer,
        dst: Point,
        src: Rect,
        recipient: Option<Arc<dyn UploadRecipient>>,
    ) -> Result<()> {
        buffer.upload(self.pixmap, self.shared.helper.gc, 32, dst, src, recipient)
    }

    /// Free the picture and pixmap, same as dropping the texture
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let backend = &self.shared.backend;
        let result = backend
            .free_picture(self.picture)
            .and_then(|()| backend.free_pixmap(self.pixmap));
        if let Err(e) = result {
            log::warn!("releasing texture 0x{:x}: {}", self.pixmap, e);
        }
    }
}
