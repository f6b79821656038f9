//! Shared vocabulary of the broker gateway: the data model handed between
//! components, the error taxonomy, and the traits a cluster backend
//! implements.

pub mod cluster;
pub mod error;
pub mod types;
pub mod util;

pub use cluster::{BrokerAdmin, BrokerFuture, RecordProducer, RecordReader};
pub use error::{ErrorKind, GatewayError};
pub use types::{
    AclEntry, AclInfo, BrokerNode, ClusterInfo, MessagePage, MessageRecord, NewTopic,
    OrderingPolicy, PartitionDiagnostic, PartitionWatermarks, Payload, ProduceAck,
    ProduceRequest, Topic,
};
pub use util::now_ms;
