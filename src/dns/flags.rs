use bitflags::bitflags;

bitflags! {
    /// The boolean flag set carried on a packet (§3). `opcode` and `rescode`
    /// are deliberately NOT part of this set -- they live as their own
    /// fields on `DnsPacket` since they're small enumerations, not bits.
    /// `INTERNAL` is the one flag with no wire representation: it marks a
    /// packet synthesized and routed by an in-process caller (e.g. the
    /// recursive resolver's glue lookups against a locally served zone)
    /// rather than one that arrived off a socket.
    pub struct PacketFlags: u16 {
        const RESP     = 0b0000_0000_0000_0001;
        const AUTH     = 0b0000_0000_0000_0010;
        const TRUNC    = 0b0000_0000_0000_0100;
        const RECURSE  = 0b0000_0000_0000_1000;
        const RECURSED = 0b0000_0000_0001_0000;
        const ISAUTHEN = 0b0000_0000_0010_0000;
        const AUTHOK   = 0b0000_0000_0100_0000;
        const INTERNAL = 0b0000_0000_1000_0000;
    }
}

impl Default for PacketFlags {
    fn default() -> PacketFlags {
        PacketFlags::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_flag_is_independent_of_others() {
        let flags = PacketFlags::RESP | PacketFlags::AUTH;
        assert!(!flags.contains(PacketFlags::INTERNAL));
        let flags = flags | PacketFlags::INTERNAL;
        assert!(flags.contains(PacketFlags::RESP));
        assert!(flags.contains(PacketFlags::INTERNAL));
    }
}
