use super::*;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::channel::ChannelFactory;
use crate::context::ContextConfig;
use crate::error::ChannelError;
use crate::gate::{AckGate, Decision};
use crate::message::{DeliveryInfo, Properties, RawDelivery, TIMEOUT_HEADER, TimeBudget};

mod common;
use common::*;
