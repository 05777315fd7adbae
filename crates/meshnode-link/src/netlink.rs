//! rtnetlink implementation of [`LinkControl`].
//!
//! Every operation opens its own `NETLINK_ROUTE` socket. A netlink socket
//! stays bound to the namespace it was created in, so a per-call socket
//! always talks to the calling thread's current namespace.

use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

use meshnode_common::constants::{BPF_FILTER_KIND, CLSACT_KIND};
use meshnode_common::types::TcDirection;
use netlink_packet_core::{
    NLM_F_ACK, NLM_F_CREATE, NLM_F_REPLACE, NLM_F_REQUEST, NetlinkMessage, NetlinkPayload,
};
use netlink_packet_route::RouteNetlinkMessage;
use netlink_packet_route::link::{InfoKind, LinkAttribute, LinkInfo as LinkInfoAttr, LinkMessage};
use netlink_packet_route::tc::{TcAttribute, TcHandle, TcMessage};
use netlink_packet_utils::Emitable;
use netlink_packet_utils::nla::DefaultNla;
use netlink_sys::protocols::NETLINK_ROUTE;
use netlink_sys::{Socket, SocketAddr};

use crate::control::{FilterSpec, LinkControl, LinkInfo};

// bpf classifier options (linux/pkt_cls.h)
const TCA_BPF_FD: u16 = 6;
const TCA_BPF_NAME: u16 = 7;
const TCA_BPF_FLAGS: u16 = 8;
const TCA_BPF_FLAG_ACT_DIRECT: u32 = 1;

const TC_H_CLSACT: u32 = 0xFFFF_FFF1;
const TC_H_MIN_INGRESS: u32 = 0xFFF2;
const TC_H_MIN_EGRESS: u32 = 0xFFF3;
const ETH_P_ALL: u16 = 0x0003;

const RECV_BUF_LEN: usize = 32 * 1024;
const SEQ: u32 = 1;

const fn tc_handle(major: u32, minor: u32) -> u32 {
    (major & 0xFFFF_0000) | (minor & 0x0000_FFFF)
}

/// Parent handle of the clsact hook for `direction`.
fn filter_parent(direction: TcDirection) -> TcHandle {
    TcHandle::from(match direction {
        TcDirection::Ingress => tc_handle(TC_H_CLSACT, TC_H_MIN_INGRESS),
        TcDirection::Egress => tc_handle(TC_H_CLSACT, TC_H_MIN_EGRESS),
    })
}

/// `tcm_info` of a filter: priority in the upper half, protocol (network
/// byte order) in the lower half.
fn filter_info(priority: u16) -> u32 {
    tc_handle(u32::from(priority) << 16, u32::from(ETH_P_ALL.to_be()))
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn ifindex(index: u32) -> io::Result<i32> {
    i32::try_from(index).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("interface index {index} out of range"),
        )
    })
}

/// Wraps `message` in a netlink request that asks for an ack.
fn request(message: RouteNetlinkMessage, flags: u16) -> Vec<u8> {
    let mut req = NetlinkMessage::from(message);
    req.header.flags = NLM_F_REQUEST | NLM_F_ACK | flags;
    req.header.sequence_number = SEQ;
    req.finalize();
    let mut buf = vec![0; req.buffer_len()];
    req.serialize(&mut buf);
    buf
}

fn clsact_message(index: i32) -> TcMessage {
    let mut msg = TcMessage::with_index(index);
    msg.header.handle = TcHandle::from(tc_handle(TC_H_CLSACT, 0));
    msg.header.parent = TcHandle::from(TC_H_CLSACT);
    msg.attributes.push(TcAttribute::Kind(CLSACT_KIND.to_owned()));
    msg
}

fn filter_message(index: i32, filter: &FilterSpec) -> TcMessage {
    let mut msg = TcMessage::with_index(index);
    msg.header.handle = TcHandle::from(filter.handle);
    msg.header.parent = filter_parent(filter.direction);
    msg.header.info = filter_info(filter.priority);
    msg.attributes.push(TcAttribute::Kind(BPF_FILTER_KIND.to_owned()));
    msg
}

/// Encoded `TCA_OPTIONS` payload of a direct-action bpf filter.
fn bpf_options(prog_fd: RawFd, name: &str) -> Vec<u8> {
    let mut name = name.as_bytes().to_vec();
    name.push(0);
    let nlas = [
        DefaultNla::new(TCA_BPF_FD, prog_fd.to_ne_bytes().to_vec()),
        DefaultNla::new(TCA_BPF_NAME, name),
        DefaultNla::new(TCA_BPF_FLAGS, TCA_BPF_FLAG_ACT_DIRECT.to_ne_bytes().to_vec()),
    ];
    let mut buf = vec![0; nlas.as_slice().buffer_len()];
    nlas.as_slice().emit(&mut buf);
    buf
}

fn kind_name(kind: &InfoKind) -> String {
    match kind {
        InfoKind::Veth => "veth".to_owned(),
        InfoKind::Other(name) => name.clone(),
        other => format!("{other:?}").to_lowercase(),
    }
}

fn parse_link(link: &LinkMessage) -> LinkInfo {
    let mut info = LinkInfo::default();
    for attr in &link.attributes {
        match attr {
            LinkAttribute::Link(peer) => info.peer_index = Some(*peer),
            LinkAttribute::LinkInfo(infos) => {
                info.kind = infos.iter().find_map(|i| match i {
                    LinkInfoAttr::Kind(kind) => Some(kind_name(kind)),
                    _ => None,
                });
            }
            _ => {}
        }
    }
    info
}

/// A connected `NETLINK_ROUTE` socket.
struct RouteSocket {
    socket: Socket,
}

impl RouteSocket {
    fn open() -> io::Result<Self> {
        let mut socket = Socket::new(NETLINK_ROUTE)?;
        let _ = socket.bind_auto()?;
        socket.connect(&SocketAddr::new(0, 0))?;
        Ok(Self { socket })
    }

    /// Sends a request and collects replies until the kernel acks.
    fn transact(&self, req: &[u8]) -> io::Result<Vec<RouteNetlinkMessage>> {
        let _ = self.socket.send(req, 0)?;
        let mut replies = Vec::new();
        let mut buf = Vec::with_capacity(RECV_BUF_LEN);
        loop {
            buf.clear();
            if self.socket.recv(&mut buf, 0)? == 0 {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            let mut offset = 0;
            while offset < buf.len() {
                let msg = NetlinkMessage::<RouteNetlinkMessage>::deserialize(&buf[offset..])
                    .map_err(|e| invalid(e.to_string()))?;
                let len = usize::try_from(msg.header.length)
                    .map_err(|_| invalid("netlink length overflow"))?;
                if len == 0 {
                    return Err(invalid("zero-length netlink message"));
                }
                offset += (len + 3) & !3;

                if msg.header.sequence_number != SEQ {
                    continue;
                }
                match msg.payload {
                    NetlinkPayload::Error(err) => {
                        return match err.code {
                            None => Ok(replies),
                            Some(code) => Err(io::Error::from_raw_os_error(code.get().saturating_neg())),
                        };
                    }
                    NetlinkPayload::Done(_) => return Ok(replies),
                    NetlinkPayload::InnerMessage(inner) => replies.push(inner),
                    _ => {}
                }
            }
        }
    }
}

/// Link control over rtnetlink.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtnlLinkControl;

impl LinkControl for RtnlLinkControl {
    fn link_info(&self, index: u32) -> io::Result<LinkInfo> {
        let mut msg = LinkMessage::default();
        msg.header.index = index;
        let replies = RouteSocket::open()?.transact(&request(RouteNetlinkMessage::GetLink(msg), 0))?;
        replies
            .iter()
            .find_map(|reply| match reply {
                RouteNetlinkMessage::NewLink(link) => Some(parse_link(link)),
                _ => None,
            })
            .ok_or_else(|| invalid("no RTM_NEWLINK reply"))
    }

    fn replace_clsact(&self, index: u32) -> io::Result<()> {
        let msg = clsact_message(ifindex(index)?);
        let req = request(
            RouteNetlinkMessage::NewQueueDiscipline(msg),
            NLM_F_CREATE | NLM_F_REPLACE,
        );
        let _ = RouteSocket::open()?.transact(&req)?;
        Ok(())
    }

    fn replace_filter(&self, index: u32, filter: &FilterSpec, prog_fd: BorrowedFd<'_>) -> io::Result<()> {
        let mut msg = filter_message(ifindex(index)?, filter);
        msg.attributes.push(TcAttribute::Other(DefaultNla::new(
            libc::TCA_OPTIONS,
            bpf_options(prog_fd.as_raw_fd(), &filter.name),
        )));
        let req = request(
            RouteNetlinkMessage::NewTrafficFilter(msg),
            NLM_F_CREATE | NLM_F_REPLACE,
        );
        let _ = RouteSocket::open()?.transact(&req)?;
        Ok(())
    }

    fn delete_filter(&self, index: u32, filter: &FilterSpec) -> io::Result<()> {
        let msg = filter_message(ifindex(index)?, filter);
        let req = request(RouteNetlinkMessage::DelTrafficFilter(msg), 0);
        let _ = RouteSocket::open()?.transact(&req)?;
        Ok(())
    }
}
