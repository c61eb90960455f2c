// The IANA root server hints table (letter -> IPv4 address), used to seed
// iterative resolution when no other nameserver is configured.

use std::net::Ipv4Addr;

pub const ROOT_HINTS: [(char, Ipv4Addr); 13] = [
    ('a', Ipv4Addr::new(198, 41, 0, 4)),
    ('b', Ipv4Addr::new(192, 228, 79, 201)),
    ('c', Ipv4Addr::new(192, 33, 4, 12)),
    ('d', Ipv4Addr::new(128, 8, 10, 90)),
    ('e', Ipv4Addr::new(192, 203, 230, 10)),
    ('f', Ipv4Addr::new(192, 5, 5, 241)),
    ('g', Ipv4Addr::new(192, 112, 36, 4)),
    ('h', Ipv4Addr::new(128, 63, 2, 53)),
    ('i', Ipv4Addr::new(192, 36, 148, 17)),
    ('j', Ipv4Addr::new(192, 58, 128, 30)),
    ('k', Ipv4Addr::new(193, 0, 14, 129)),
    ('l', Ipv4Addr::new(198, 32, 64, 12)),
    ('m', Ipv4Addr::new(202, 12, 27, 33)),
];

pub fn addresses() -> Vec<Ipv4Addr> {
    ROOT_HINTS.iter().map(|(_, ip)| *ip).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_thirteen_letters() {
        assert_eq!(ROOT_HINTS.len(), 13);
        assert_eq!(ROOT_HINTS[0].0, 'a');
        assert_eq!(ROOT_HINTS[12].0, 'm');
    }

    #[test]
    fn a_root_matches_known_address() {
        let a = ROOT_HINTS.iter().find(|(letter, _)| *letter == 'a').unwrap();
        assert_eq!(a.1, Ipv4Addr::new(198, 41, 0, 4));
    }
}
