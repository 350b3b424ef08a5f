use crate::tracker::Digest;

/// Maps digests to the shard that owns them.
///
/// Shard `n` listens on `base_port + n`. A digest belongs to shard
/// `routing_bits % instances`, where `routing_bits` are its trailing 12 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRouter {
    base_port: u16,
    instances: u16,
    own_port: u16,
}

impl ShardRouter {
    pub fn new(base_port: u16, instances: u16, own_port: u16) -> Self {
        assert!(instances > 0, "at least one shard is required");
        assert!(
            own_port >= base_port && own_port - base_port < instances,
            "port {own_port} is outside the shard range starting at {base_port}"
        );
        Self { base_port, instances, own_port }
    }

    pub fn own_port(&self) -> u16 {
        self.own_port
    }

    pub fn instances(&self) -> u16 {
        self.instances
    }

    /// Position of this shard in the ring.
    pub fn shard_index(&self) -> u16 {
        self.own_port - self.base_port
    }

    pub fn port_for(&self, digest: &Digest) -> u16 {
        self.base_port + digest.routing_bits() % self.instances
    }

    pub fn is_local(&self, digest: &Digest) -> bool {
        self.port_for(digest) == self.own_port
    }

    /// Next shard in the ring, or `None` when running alone.
    pub fn successor_port(&self) -> Option<u16> {
        (self.instances > 1)
            .then(|| self.base_port + (self.shard_index() + 1) % self.instances)
    }
}
