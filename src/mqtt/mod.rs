// SPDX-License-Identifier: GPL-3.0-or-later
mod external_value;
mod home_assistant;
mod settings;
mod sink;

pub(crate) use home_assistant::Device;
pub(crate) use settings::MqttSettings;
pub(crate) use sink::{run_event_loop, MqttSink};
