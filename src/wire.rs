// SPDX-License-Identifier: GPL-2.0-or-later
//
// Bit-exact encode/decode of wire frames. All integer
// fields are big-endian; frames shorter than `MIN_FRAME_LEN` are zero
// padded on encode. Every decode validates length fields against the
// actual payload length before using them.

use crate::config::MIN_FRAME_LEN;
use crate::error::Status;

/// The closed set of opcodes carried by the common header. A tagged sum
/// with an exhaustive match is used for dispatch rather than a function
/// pointer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Tiny = 0,
    Small = 1,
    MediumFrag = 2,
    Rendezvous = 3,
    Notify = 4,
    PullRequest = 5,
    PullReply = 6,
    Connect = 7,
    Truc = 8,
    NackLib = 9,
    NackMcp = 10,
    Raw = 11,
    HostQuery = 12,
    HostReply = 13,
}

impl OpCode {
    pub fn from_u8(b: u8) -> Option<Self> {
        use OpCode::*;
        Some(match b {
            0 => Tiny,
            1 => Small,
            2 => MediumFrag,
            3 => Rendezvous,
            4 => Notify,
            5 => PullRequest,
            6 => PullReply,
            7 => Connect,
            8 => Truc,
            9 => NackLib,
            10 => NackMcp,
            11 => Raw,
            12 => HostQuery,
            13 => HostReply,
            _ => return None,
        })
    }
}

/// Fields common to every frame: `{src_endpoint, dst_endpoint, opcode}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonHeader {
    pub src_endpoint: u8,
    pub dst_endpoint: u8,
    pub opcode: OpCode,
}

const COMMON_LEN: usize = 3;

impl CommonHeader {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.src_endpoint);
        out.push(self.dst_endpoint);
        out.push(self.opcode as u8);
    }

    fn decode(buf: &[u8]) -> Result<(Self, &[u8]), Status> {
        if buf.len() < COMMON_LEN {
            return Err(Status::Invalid);
        }
        let opcode = OpCode::from_u8(buf[2]).ok_or(Status::Invalid)?;
        Ok((
            Self {
                src_endpoint: buf[0],
                dst_endpoint: buf[1],
                opcode,
            },
            &buf[COMMON_LEN..],
        ))
    }
}

/// Pad `buf` up to the minimum Ethernet payload length.
fn pad_to_min_frame(buf: &mut Vec<u8>) {
    if buf.len() < MIN_FRAME_LEN {
        buf.resize(MIN_FRAME_LEN, 0);
    }
}

// ---------------------------------------------------------------------------
// TINY / SMALL: length:u16, lib_seqnum:u16, match_info:u64, then payload.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TinySmallFrame {
    pub common: CommonHeader,
    pub lib_seqnum: u16,
    pub match_info: u64,
    pub payload: Vec<u8>,
}

impl TinySmallFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMON_LEN + 12 + self.payload.len());
        self.common.encode(&mut out);
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.lib_seqnum.to_be_bytes());
        out.extend_from_slice(&self.match_info.to_be_bytes());
        out.extend_from_slice(&self.payload);
        pad_to_min_frame(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Status> {
        let (common, rest) = CommonHeader::decode(buf)?;
        if rest.len() < 12 {
            return Err(Status::Invalid);
        }
        let length = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        let lib_seqnum = u16::from_be_bytes([rest[2], rest[3]]);
        let match_info = u64::from_be_bytes(rest[4..12].try_into().unwrap());
        let body = &rest[12..];
        if length > body.len() {
            return Err(Status::Invalid);
        }
        Ok(Self {
            common,
            lib_seqnum,
            match_info,
            payload: body[..length].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// MEDIUM_FRAG: TINY/SMALL fields plus msg_length:u32, frag_seqnum:u8,
// frag_pipeline:u8, frag_length:u16.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MediumFragFrame {
    pub common: CommonHeader,
    pub lib_seqnum: u16,
    pub match_info: u64,
    pub msg_length: u32,
    pub frag_seqnum: u8,
    /// Echoed field; the interplay with the receive window is left
    /// open and is not otherwise interpreted here.
    pub frag_pipeline: u8,
    pub payload: Vec<u8>,
}

impl MediumFragFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMON_LEN + 20 + self.payload.len());
        self.common.encode(&mut out);
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.lib_seqnum.to_be_bytes());
        out.extend_from_slice(&self.match_info.to_be_bytes());
        out.extend_from_slice(&self.msg_length.to_be_bytes());
        out.push(self.frag_seqnum);
        out.push(self.frag_pipeline);
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        pad_to_min_frame(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Status> {
        let (common, rest) = CommonHeader::decode(buf)?;
        if rest.len() < 20 {
            return Err(Status::Invalid);
        }
        let _length = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        let lib_seqnum = u16::from_be_bytes([rest[2], rest[3]]);
        let match_info = u64::from_be_bytes(rest[4..12].try_into().unwrap());
        let msg_length = u32::from_be_bytes(rest[12..16].try_into().unwrap());
        let frag_seqnum = rest[16];
        let frag_pipeline = rest[17];
        let frag_length = u16::from_be_bytes([rest[18], rest[19]]) as usize;
        let body = &rest[20..];
        if frag_length > body.len() {
            return Err(Status::Invalid);
        }
        Ok(Self {
            common,
            lib_seqnum,
            match_info,
            msg_length,
            frag_seqnum,
            frag_pipeline,
            payload: body[..frag_length].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// RENDEZVOUS / NOTIFY: event-only classes, small header, no payload.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct RendezvousFrame {
    pub common: CommonHeader,
    pub lib_seqnum: u16,
    pub match_info: u64,
    pub msg_length: u32,
    /// Region id the puller should pull from.
    pub rdma_id: u8,
}

impl RendezvousFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMON_LEN + 15);
        self.common.encode(&mut out);
        out.extend_from_slice(&self.lib_seqnum.to_be_bytes());
        out.extend_from_slice(&self.match_info.to_be_bytes());
        out.extend_from_slice(&self.msg_length.to_be_bytes());
        out.push(self.rdma_id);
        pad_to_min_frame(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Status> {
        let (common, rest) = CommonHeader::decode(buf)?;
        if rest.len() < 15 {
            return Err(Status::Invalid);
        }
        let lib_seqnum = u16::from_be_bytes([rest[0], rest[1]]);
        let match_info = u64::from_be_bytes(rest[2..10].try_into().unwrap());
        let msg_length = u32::from_be_bytes(rest[10..14].try_into().unwrap());
        let rdma_id = rest[14];
        Ok(Self {
            common,
            lib_seqnum,
            match_info,
            msg_length,
            rdma_id,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NotifyFrame {
    pub common: CommonHeader,
    pub lib_seqnum: u16,
}

impl NotifyFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMON_LEN + 2);
        self.common.encode(&mut out);
        out.extend_from_slice(&self.lib_seqnum.to_be_bytes());
        pad_to_min_frame(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Status> {
        let (common, rest) = CommonHeader::decode(buf)?;
        if rest.len() < 2 {
            return Err(Status::Invalid);
        }
        Ok(Self {
            common,
            lib_seqnum: u16::from_be_bytes([rest[0], rest[1]]),
        })
    }
}

// ---------------------------------------------------------------------------
// PULL_REQUEST / PULL_REPLY
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct PullRequestFrame {
    pub common: CommonHeader,
    pub length: u32,
    pub puller_rdma_id: u8,
    pub puller_offset: u32,
    pub pulled_rdma_id: u8,
    pub pulled_offset: u32,
    pub src_pull_handle: u32,
    pub src_magic: u32,
}

impl PullRequestFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMON_LEN + 22);
        self.common.encode(&mut out);
        out.extend_from_slice(&self.length.to_be_bytes());
        out.push(self.puller_rdma_id);
        out.extend_from_slice(&self.puller_offset.to_be_bytes());
        out.push(self.pulled_rdma_id);
        out.extend_from_slice(&self.pulled_offset.to_be_bytes());
        out.extend_from_slice(&self.src_pull_handle.to_be_bytes());
        out.extend_from_slice(&self.src_magic.to_be_bytes());
        pad_to_min_frame(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Status> {
        let (common, rest) = CommonHeader::decode(buf)?;
        if rest.len() < 22 {
            return Err(Status::Invalid);
        }
        Ok(Self {
            common,
            length: u32::from_be_bytes(rest[0..4].try_into().unwrap()),
            puller_rdma_id: rest[4],
            puller_offset: u32::from_be_bytes(rest[5..9].try_into().unwrap()),
            pulled_rdma_id: rest[9],
            pulled_offset: u32::from_be_bytes(rest[10..14].try_into().unwrap()),
            src_pull_handle: u32::from_be_bytes(rest[14..18].try_into().unwrap()),
            src_magic: u32::from_be_bytes(rest[18..22].try_into().unwrap()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PullReplyFrame {
    pub common: CommonHeader,
    pub puller_rdma_id: u8,
    pub puller_offset: u32,
    pub dst_pull_handle: u32,
    pub dst_magic: u32,
    pub payload: Vec<u8>,
}

impl PullReplyFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMON_LEN + 17 + self.payload.len());
        self.common.encode(&mut out);
        out.push(self.puller_rdma_id);
        out.extend_from_slice(&self.puller_offset.to_be_bytes());
        out.extend_from_slice(&self.dst_pull_handle.to_be_bytes());
        out.extend_from_slice(&self.dst_magic.to_be_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        pad_to_min_frame(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Status> {
        let (common, rest) = CommonHeader::decode(buf)?;
        if rest.len() < 17 {
            return Err(Status::Invalid);
        }
        let puller_rdma_id = rest[0];
        let puller_offset = u32::from_be_bytes(rest[1..5].try_into().unwrap());
        let dst_pull_handle = u32::from_be_bytes(rest[5..9].try_into().unwrap());
        let dst_magic = u32::from_be_bytes(rest[9..13].try_into().unwrap());
        let length = u32::from_be_bytes(rest[13..17].try_into().unwrap()) as usize;
        let body = &rest[17..];
        if length > body.len() {
            return Err(Status::Invalid);
        }
        Ok(Self {
            common,
            puller_rdma_id,
            puller_offset,
            dst_pull_handle,
            dst_magic,
            payload: body[..length].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// CONNECT: seqnum:u16, length:u16, then request or reply body.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum ConnectBody {
    Request {
        src_session_id: u32,
        app_key: u32,
        connect_seqnum: u32,
    },
    Reply {
        src_session_id: u32,
        target_session_id: u32,
        connect_seqnum: u32,
        target_recv_seqnum_start: u16,
        status_code: u8,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct ConnectFrame {
    pub common: CommonHeader,
    pub seqnum: u16,
    pub body: ConnectBody,
}

impl ConnectFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut body_buf = Vec::new();
        match self.body {
            ConnectBody::Request {
                src_session_id,
                app_key,
                connect_seqnum,
            } => {
                body_buf.extend_from_slice(&src_session_id.to_be_bytes());
                body_buf.extend_from_slice(&app_key.to_be_bytes());
                body_buf.extend_from_slice(&connect_seqnum.to_be_bytes());
                body_buf.push(0); // is_reply = 0
            }
            ConnectBody::Reply {
                src_session_id,
                target_session_id,
                connect_seqnum,
                target_recv_seqnum_start,
                status_code,
            } => {
                body_buf.extend_from_slice(&src_session_id.to_be_bytes());
                body_buf.extend_from_slice(&target_session_id.to_be_bytes());
                body_buf.extend_from_slice(&connect_seqnum.to_be_bytes());
                body_buf.extend_from_slice(&target_recv_seqnum_start.to_be_bytes());
                body_buf.push(status_code);
                body_buf.push(1); // is_reply = 1
            }
        }

        let mut out = Vec::with_capacity(COMMON_LEN + 4 + body_buf.len());
        self.common.encode(&mut out);
        out.extend_from_slice(&self.seqnum.to_be_bytes());
        out.extend_from_slice(&(body_buf.len() as u16).to_be_bytes());
        out.extend_from_slice(&body_buf);
        pad_to_min_frame(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Status> {
        let (common, rest) = CommonHeader::decode(buf)?;
        if rest.len() < 4 {
            return Err(Status::Invalid);
        }
        let seqnum = u16::from_be_bytes([rest[0], rest[1]]);
        let length = u16::from_be_bytes([rest[2], rest[3]]) as usize;
        let body_buf = &rest[4..];
        if length > body_buf.len() {
            return Err(Status::Invalid);
        }
        let body_buf = &body_buf[..length];

        let is_reply = *body_buf.last().ok_or(Status::Invalid)?;
        let body = if is_reply == 0 {
            if body_buf.len() < 13 {
                return Err(Status::Invalid);
            }
            ConnectBody::Request {
                src_session_id: u32::from_be_bytes(body_buf[0..4].try_into().unwrap()),
                app_key: u32::from_be_bytes(body_buf[4..8].try_into().unwrap()),
                connect_seqnum: u32::from_be_bytes(body_buf[8..12].try_into().unwrap()),
            }
        } else {
            if body_buf.len() < 16 {
                return Err(Status::Invalid);
            }
            ConnectBody::Reply {
                src_session_id: u32::from_be_bytes(body_buf[0..4].try_into().unwrap()),
                target_session_id: u32::from_be_bytes(body_buf[4..8].try_into().unwrap()),
                connect_seqnum: u32::from_be_bytes(body_buf[8..12].try_into().unwrap()),
                target_recv_seqnum_start: u16::from_be_bytes([body_buf[12], body_buf[13]]),
                status_code: body_buf[14],
            }
        };

        Ok(Self {
            common,
            seqnum,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// TRUC / NACK_LIB / NACK_MCP: small out-of-band frames.
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TrucFrame {
    pub common: CommonHeader,
    pub payload: Vec<u8>,
}

impl TrucFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMON_LEN + 2 + self.payload.len());
        self.common.encode(&mut out);
        out.extend_from_slice(&(self.payload.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.payload);
        pad_to_min_frame(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Status> {
        let (common, rest) = CommonHeader::decode(buf)?;
        if rest.len() < 2 {
            return Err(Status::Invalid);
        }
        let length = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        let body = &rest[2..];
        if length > body.len() {
            return Err(Status::Invalid);
        }
        Ok(Self {
            common,
            payload: body[..length].to_vec(),
        })
    }
}

/// Shared shape for NACK_LIB and NACK_MCP: the sequence number being
/// nacked, and which status caused it.
#[derive(Debug, Clone, Copy)]
pub struct NackFrame {
    pub common: CommonHeader,
    pub lib_seqnum: u16,
    pub status: Status,
}

impl NackFrame {
    fn status_to_byte(status: Status) -> u8 {
        match status {
            Status::BadEndpoint => 0,
            Status::EndpointClosed => 1,
            Status::BadSession => 2,
            _ => 255,
        }
    }

    fn status_from_byte(b: u8) -> Result<Status, Status> {
        match b {
            0 => Ok(Status::BadEndpoint),
            1 => Ok(Status::EndpointClosed),
            2 => Ok(Status::BadSession),
            _ => Err(Status::Invalid),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(COMMON_LEN + 3);
        self.common.encode(&mut out);
        out.extend_from_slice(&self.lib_seqnum.to_be_bytes());
        out.push(Self::status_to_byte(self.status));
        pad_to_min_frame(&mut out);
        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Status> {
        let (common, rest) = CommonHeader::decode(buf)?;
        if rest.len() < 3 {
            return Err(Status::Invalid);
        }
        Ok(Self {
            common,
            lib_seqnum: u16::from_be_bytes([rest[0], rest[1]]),
            status: Self::status_from_byte(rest[2])?,
        })
    }
}
