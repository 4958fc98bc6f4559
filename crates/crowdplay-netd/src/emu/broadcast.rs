//! Frame and audio fan-out.
//!
//! Binary payload layout is this broadcaster's to define:
//!
//! - `frame,diff,<w>,<h>,<payload>`: 8 bytes per changed pixel, x/y as
//!   u16 little-endian then r, g, b and a visibility byte.
//! - `frame,full,<w>,<h>,<payload>`: 4 bytes per pixel (r, g, b,
//!   visibility), row-major.
//! - `frame,webp,<w>,<h>,<payload>`: lossless WebP of the RGB plane, sent
//!   to clients that declared the capability; the visibility bit is not
//!   carried in this variant.
//! - `audio,<payload>`: interleaved stereo i16 little-endian samples.

use bytes::Bytes;
use image::ExtendedColorType;
use image::codecs::webp::WebPEncoder;
use tracing::warn;

use crowdplay_proto::encode_bytes;
use crowdplay_retro::{FrameUpdate, Pixel};

use crate::server::ServerCore;
use crate::user::User;

/// Send one update to every viewer of the emulator, picking the encoding
/// each user can handle. Encodings are produced at most once per call.
pub fn broadcast_update(server: &ServerCore, emu_id: &str, update: &FrameUpdate) {
    let users = server.users_of_emu(emu_id);
    if users.is_empty() {
        return;
    }

    let mut raw: Option<Bytes> = None;
    let mut webp: Option<Option<Bytes>> = None;

    for user in users {
        let frame = frame_for_user(&user, update, &mut raw, &mut webp);
        if !user.send_binary(frame) {
            warn!(conn = user.conn, "frame send failed, closing connection");
            user.close();
        }
    }
}

/// One-off encoding for a single user, used when a viewer first attaches.
pub fn frame_for_new_viewer(user: &User, update: &FrameUpdate) -> Bytes {
    frame_for_user(user, update, &mut None, &mut None)
}

fn frame_for_user(
    user: &User,
    update: &FrameUpdate,
    raw: &mut Option<Bytes>,
    webp: &mut Option<Option<Bytes>>,
) -> Bytes {
    let wants_webp = user
        .supports_webp
        .load(std::sync::atomic::Ordering::Acquire);

    if wants_webp && let FrameUpdate::Full { width, height, pixels } = update {
        let encoded = webp
            .get_or_insert_with(|| encode_webp(*width, *height, pixels))
            .clone();
        if let Some(frame) = encoded {
            return frame;
        }
        // Encoder failure: fall through to the raw layout.
    }

    raw.get_or_insert_with(|| encode_raw(update)).clone()
}

fn encode_raw(update: &FrameUpdate) -> Bytes {
    match update {
        FrameUpdate::Full { width, height, pixels } => {
            let mut payload = Vec::with_capacity(pixels.len() * 4);
            for px in pixels {
                payload.extend_from_slice(&[px.r, px.g, px.b, px.visible as u8]);
            }
            encode_frame("full", *width, *height, payload)
        }
        FrameUpdate::Diff { width, height, changed } => {
            let mut payload = Vec::with_capacity(changed.len() * 8);
            for (x, y, px) in changed {
                payload.extend_from_slice(&x.to_le_bytes());
                payload.extend_from_slice(&y.to_le_bytes());
                payload.extend_from_slice(&[px.r, px.g, px.b, px.visible as u8]);
            }
            encode_frame("diff", *width, *height, payload)
        }
    }
}

fn encode_webp(width: u32, height: u32, pixels: &[Pixel]) -> Option<Bytes> {
    let mut rgb = Vec::with_capacity(pixels.len() * 3);
    for px in pixels {
        rgb.extend_from_slice(&[px.r, px.g, px.b]);
    }

    let mut out = Vec::new();
    let encoder = WebPEncoder::new_lossless(&mut out);
    match encoder.encode(&rgb, width, height, ExtendedColorType::Rgb8) {
        Ok(()) => Some(encode_frame("webp", width, height, out)),
        Err(e) => {
            warn!(error = %e, "webp encode failed, falling back to raw");
            None
        }
    }
}

fn encode_frame(kind: &str, width: u32, height: u32, payload: Vec<u8>) -> Bytes {
    Bytes::from(encode_bytes(&[
        b"frame".to_vec(),
        kind.as_bytes().to_vec(),
        width.to_string().into_bytes(),
        height.to_string().into_bytes(),
        payload,
    ]))
}

pub fn encode_audio(samples: &[i16]) -> Bytes {
    let mut payload = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        payload.extend_from_slice(&sample.to_le_bytes());
    }
    Bytes::from(encode_bytes(&[b"audio".to_vec(), payload]))
}
