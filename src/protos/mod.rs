include!(concat!(env!("OUT_DIR"), "/protos/mod.rs"));

pub use self::hllplus_unique::HyperLogLogPlusUniqueStateProto;
