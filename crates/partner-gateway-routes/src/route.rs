//! The observable active-route record.

use crate::consumer::ConsumerHandle;

pub struct ActiveRoute {
    pub route_id: String,
    pub config_version: u64,
    pub consumer_handle: ConsumerHandle,
}
