// Reference RFC 1035 ( https://tools.ietf.org/html/rfc1035) and a bajillion
// others that have made updates to it.
// See: https://www.iana.org/assignments/dns-parameters/dns-parameters.xhtml

pub mod bigendians;
pub mod cache;
pub mod class;
pub mod config;
pub mod ddns;
pub mod errors;
pub mod flags;
pub mod handler;
pub mod names;
pub mod opcode;
pub mod packet;
pub mod question;
pub mod rcode;
pub mod rdata;
pub mod resolver;
pub mod rr;
pub mod rrtype;
pub mod server;
pub mod tsig;
pub mod wire;
pub mod zone;
