//! X11 Backend - Connection to a real X11 server
//!
//! Wraps an x11rb `RustConnection`. Most requests without replies are sent
//! unchecked, and a server error for one of them is discarded by the dispatch
//! thread. Requests whose failure the caller must see (the helper colormap,
//! attaching a segment) are checked with a round trip.

use super::*;
use crate::error::Error;
use std::os::fd::OwnedFd;
use x11rb::connection::{Connection, RequestConnection};
use x11rb::cookie::VoidCookie;
use x11rb::errors::ConnectionError;
use x11rb::protocol::render::{self, ConnectionExt as _, CreatePictureAux, PictType};
use x11rb::protocol::shm::ConnectionExt as _;
use x11rb::protocol::xproto::{
    self, ColormapAlloc, ConnectionExt as _, CreateGCAux, CreateWindowAux, ImageFormat, PropMode,
    WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

pub struct X11Backend {
    conn: RustConnection,
    screen: ScreenInfo,
}

impl X11Backend {
    /// Connect to `display`, or to `$DISPLAY` when `None`
    pub fn connect(display: Option<&str>) -> BackendResult<Self> {
        let (conn, screen_num) = x11rb::connect(display)?;
        let screen = screen_info(&conn.setup().roots[screen_num]);

        log::debug!(
            "X11 backend connected to screen {}: {}x{} root=0x{:x} depth={}",
            screen_num,
            screen.width,
            screen.height,
            screen.root,
            screen.root_depth
        );

        Ok(Self { conn, screen })
    }
}

fn screen_info(screen: &xproto::Screen) -> ScreenInfo {
    let visuals = screen
        .allowed_depths
        .iter()
        .flat_map(|depth| {
            depth.visuals.iter().map(move |v| VisualInfo {
                visual_id: v.visual_id,
                depth: depth.depth,
                class: u8::from(v.class),
                red_mask: v.red_mask,
                green_mask: v.green_mask,
                blue_mask: v.blue_mask,
            })
        })
        .collect();

    ScreenInfo {
        root: screen.root,
        root_depth: screen.root_depth,
        root_visual: screen.root_visual,
        width: screen.width_in_pixels,
        height: screen.height_in_pixels,
        visuals,
    }
}

fn pict_format_info(f: &render::Pictforminfo) -> PictFormatInfo {
    PictFormatInfo {
        id: f.id,
        depth: f.depth,
        direct: f.type_ == PictType::DIRECT,
        layout: DirectFormat {
            red_shift: f.direct.red_shift,
            red_mask: f.direct.red_mask,
            green_shift: f.direct.green_shift,
            green_mask: f.direct.green_mask,
            blue_shift: f.direct.blue_shift,
            blue_mask: f.direct.blue_mask,
            alpha_shift: f.direct.alpha_shift,
            alpha_mask: f.direct.alpha_mask,
        },
    }
}

/// Send a request without reply; errors for it arrive as events
fn sent(
    op: &'static str,
    cookie: Result<VoidCookie<'_, RustConnection>, ConnectionError>,
) -> BackendResult<()> {
    cookie.map(drop).map_err(Error::connection(op))
}

impl Backend for X11Backend {
    fn screen_info(&self) -> &ScreenInfo {
        &self.screen
    }

    fn has_extension(&self, name: &'static str) -> BackendResult<bool> {
        self.conn
            .extension_information(name)
            .map(|info| info.is_some())
            .map_err(Error::connection("QueryExtension"))
    }

    fn generate_id(&self, op: &'static str) -> BackendResult<Xid> {
        self.conn.generate_id().map_err(Error::id(op))
    }

    fn intern_atom(&self, name: &str) -> BackendResult<Atom> {
        let reply = self
            .conn
            .intern_atom(false, name.as_bytes())
            .map_err(Error::connection("InternAtom"))?
            .reply()
            .map_err(Error::reply("InternAtom"))?;
        Ok(reply.atom)
    }

    fn query_pict_formats(&self) -> BackendResult<Vec<PictFormatInfo>> {
        let reply = self
            .conn
            .render_query_pict_formats()
            .map_err(Error::connection("QueryPictFormats"))?
            .reply()
            .map_err(Error::reply("QueryPictFormats"))?;
        Ok(reply.formats.iter().map(pict_format_info).collect())
    }

    fn create_colormap(&self, colormap: Xid, window: Xid, visual: u32) -> BackendResult<()> {
        self.conn
            .create_colormap(ColormapAlloc::NONE, colormap, window, visual)
            .map_err(Error::connection("CreateColormap"))?
            .check()
            .map_err(Error::reply("CreateColormap"))
    }

    fn create_window(&self, params: &WindowParams) -> BackendResult<()> {
        let aux = CreateWindowAux::new()
            .event_mask(params.event_mask)
            .border_pixel(params.border_pixel)
            .colormap(params.colormap);
        sent(
            "CreateWindow",
            self.conn.create_window(
                params.depth,
                params.id,
                params.parent,
                params.x,
                params.y,
                params.width,
                params.height,
                params.border_width,
                WindowClass::INPUT_OUTPUT,
                params.visual,
                &aux,
            ),
        )
    }

    fn destroy_window(&self, window: Xid) -> BackendResult<()> {
        sent("DestroyWindow", self.conn.destroy_window(window))
    }

    fn map_window(&self, window: Xid) -> BackendResult<()> {
        sent("MapWindow", self.conn.map_window(window))
    }

    fn change_property(
        &self,
        window: Xid,
        property: Atom,
        type_: Atom,
        format: u8,
        len: u32,
        data: &[u8],
    ) -> BackendResult<()> {
        sent(
            "ChangeProperty",
            self.conn
                .change_property(PropMode::REPLACE, window, property, type_, format, len, data),
        )
    }

    fn create_gc(&self, gc: Xid, drawable: Xid) -> BackendResult<()> {
        sent(
            "CreateGC",
            self.conn.create_gc(gc, drawable, &CreateGCAux::new()),
        )
    }

    fn free_gc(&self, gc: Xid) -> BackendResult<()> {
        sent("FreeGC", self.conn.free_gc(gc))
    }

    fn create_pixmap(
        &self,
        depth: u8,
        pixmap: Xid,
        drawable: Xid,
        width: u16,
        height: u16,
    ) -> BackendResult<()> {
        sent(
            "CreatePixmap",
            self.conn
                .create_pixmap(depth, pixmap, drawable, width, height),
        )
    }

    fn free_pixmap(&self, pixmap: Xid) -> BackendResult<()> {
        sent("FreePixmap", self.conn.free_pixmap(pixmap))
    }

    fn create_picture(&self, picture: Xid, drawable: Xid, format: Xid) -> BackendResult<()> {
        sent(
            "CreatePicture",
            self.conn
                .render_create_picture(picture, drawable, format, &CreatePictureAux::new()),
        )
    }

    fn free_picture(&self, picture: Xid) -> BackendResult<()> {
        sent("FreePicture", self.conn.render_free_picture(picture))
    }

    fn shm_query_version(&self) -> BackendResult<(u16, u16)> {
        let reply = self
            .conn
            .shm_query_version()
            .map_err(Error::connection("ShmQueryVersion"))?
            .reply()
            .map_err(Error::reply("ShmQueryVersion"))?;
        Ok((reply.major_version, reply.minor_version))
    }

    fn shm_attach_fd(&self, segment: Xid, fd: OwnedFd, read_only: bool) -> BackendResult<()> {
        self.conn
            .shm_attach_fd(segment, fd, read_only)
            .map_err(Error::connection("ShmAttachFd"))?
            .check()
            .map_err(Error::reply("ShmAttachFd"))
    }

    fn shm_detach(&self, segment: Xid) -> BackendResult<()> {
        sent("ShmDetach", self.conn.shm_detach(segment))
    }

    fn shm_put_image(&self, p: &PutImageParams) -> BackendResult<SequenceNumber> {
        let cookie = self
            .conn
            .shm_put_image(
                p.drawable,
                p.gc,
                p.total_width,
                p.total_height,
                p.src_x,
                p.src_y,
                p.src_width,
                p.src_height,
                p.dst_x,
                p.dst_y,
                p.depth,
                ImageFormat::Z_PIXMAP.into(),
                true,
                p.segment,
                0,
            )
            .map_err(Error::connection("ShmPutImage"))?;
        Ok(cookie.sequence_number())
    }

    fn flush(&self) -> BackendResult<()> {
        self.conn.flush().map_err(Error::connection("Flush"))
    }

    fn wait_for_event(&self) -> BackendResult<Event> {
        self.conn
            .wait_for_event()
            .map_err(Error::connection("WaitForEvent"))
    }
}

