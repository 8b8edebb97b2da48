// SPDX-License-Identifier: MIT OR Apache-2.0
//! Opaque passthrough for ports flagged `opaque=true`.

use super::{ConverterPair, PortContext};
use crate::error::ConversionError;
use crate::value::{GraphValue, HostValue};

/// Carries the engine value unchanged in both directions
pub const OPAQUE: ConverterPair = ConverterPair {
    to_engine: opaque_to_engine,
    to_host: opaque_to_host,
};

fn opaque_to_engine(
    ctx: &PortContext<'_>,
    value: &HostValue,
    current: &GraphValue,
) -> Result<GraphValue, ConversionError> {
    match value {
        HostValue::Opaque(inner) => Ok((**inner).clone()),
        // nothing connected: the engine keeps what it has
        HostValue::Empty => Ok(current.clone()),
        other => Err(ctx.host_shape(other)),
    }
}

fn opaque_to_host(_ctx: &PortContext<'_>, value: &GraphValue) -> Result<HostValue, ConversionError> {
    Ok(HostValue::Opaque(Box::new(value.clone())))
}
