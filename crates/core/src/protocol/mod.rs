//! Text artifacts handed to the transcoder.
//!
//! The transcoder learns about the relayed stream from one SDP file
//! ([`sdp`]). It opens that file with RTP input restricted to the
//! `file,rtp,udp` protocols and then listens on the ports the file names.

pub mod sdp;

pub use sdp::render_sdp;
