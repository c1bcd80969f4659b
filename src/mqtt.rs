//! Home-automation message bus integration.
//!
//! Publishes retained daemon state to `<device>/state/...`, announces the
//! device to Home Assistant through MQTT discovery documents, and listens
//! for `<device>/command/...` messages. Availability is handled by the
//! broker: `<device>/status` carries `online` after connect and the
//! last-will flips it to `offline` on an unclean disconnect.
//!
//! Publishing never blocks the capture loop. Messages are enqueued with
//! `try_publish`; while the bus is down (or the queue is full) updates
//! are dropped with a debug log line and capture carries on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rumqttc::{Client, Event, LastWill, MqttOptions, Packet, QoS};
use serde_json::json;

use crate::config::MqttConfig;
use crate::constants::*;
use crate::controller::{CaptureRecord, ModeController};
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct StatusPublisher {
    client: Client,
    device: String,
    connected: Arc<AtomicBool>,
}

/// Connect to the broker and spawn the connection-driving thread.
///
/// The thread owns the event loop: it completes the connect handshake,
/// subscribes to the command topics, re-registers discovery documents on
/// every reconnect, and dispatches inbound commands to the controller.
pub fn connect(
    config: &MqttConfig,
    controller: Arc<ModeController>,
    running: Arc<AtomicBool>,
) -> Result<StatusPublisher> {
    let device = config.device_id.clone();

    let mut options = MqttOptions::new(device.clone(), config.host.clone(), config.port);
    options.set_keep_alive(Duration::from_secs(MQTT_KEEP_ALIVE_SECS));
    options.set_max_packet_size(MQTT_MAX_PACKET_BYTES, MQTT_MAX_PACKET_BYTES);
    options.set_last_will(LastWill::new(
        availability_topic(&device),
        "offline",
        QoS::AtLeastOnce,
        true,
    ));
    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username.clone(), password.clone());
    }

    let (client, mut connection) = Client::new(options, MQTT_CHANNEL_CAPACITY);
    let connected = Arc::new(AtomicBool::new(false));

    let publisher = StatusPublisher {
        client: client.clone(),
        device: device.clone(),
        connected: connected.clone(),
    };

    std::thread::Builder::new()
        .name("mqtt".into())
        .spawn(move || {
            let mut reported_down = false;
            for event in connection.iter() {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        connected.store(true, Ordering::SeqCst);
                        reported_down = false;
                        log_block_start!("Connected to MQTT broker");
                        on_connected(&client, &device);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let payload = String::from_utf8_lossy(&publish.payload).to_string();
                        handle_command(&publish.topic, &payload, &device, &controller, &running);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        connected.store(false, Ordering::SeqCst);
                        if !reported_down {
                            log_pipe!();
                            log_warning!("MQTT connection lost: {e}");
                            reported_down = true;
                        }
                        std::thread::sleep(Duration::from_secs(5));
                    }
                }
            }
        })
        .map_err(|e| Error::Bus(format!("failed to spawn MQTT thread: {e}")))?;

    Ok(publisher)
}

// Post-connect work: command subscription, availability, discovery.
fn on_connected(client: &Client, device: &str) {
    if let Err(e) = client.subscribe(format!("{device}/command/#"), QoS::AtLeastOnce) {
        log_warning!("MQTT command subscription failed: {e}");
    }
    if let Err(e) = client.try_publish(availability_topic(device), QoS::AtLeastOnce, true, "online")
    {
        log_warning!("MQTT availability publish failed: {e}");
    }
    register_entities(client, device);
}

fn handle_command(
    topic: &str,
    payload: &str,
    device: &str,
    controller: &ModeController,
    running: &AtomicBool,
) {
    log_block_start!("MQTT command on {topic}: {payload}");

    if topic == format!("{device}/command/capture") {
        if payload == "ON" {
            controller.enable_capture();
        } else {
            controller.disable_capture();
        }
    } else if topic == format!("{device}/command/reboot") {
        log_decorated!("Reboot requested; shutting down for supervisor restart");
        running.store(false, Ordering::SeqCst);
    } else {
        log_debug!("Ignoring unknown command topic {topic}");
    }
}

/// Register entities with Home Assistant via MQTT discovery (retained).
fn register_entities(client: &Client, device: &str) {
    let device_info = json!({
        "identifiers": [device],
        "name": "Timelapse Camera",
        "model": "Raspberry Pi Camera",
        "manufacturer": "heliocam",
        "sw_version": env!("CARGO_PKG_VERSION"),
    });
    let availability = json!([{ "topic": availability_topic(device) }]);

    let entities: [(&str, &str, serde_json::Value); 5] = [
        (
            "switch",
            "capture",
            json!({
                "name": "Timelapse Capture",
                "unique_id": format!("{device}_capture"),
                "command_topic": format!("{device}/command/capture"),
                "state_topic": format!("{device}/state/capture"),
                "value_template": "{{ value_json.state }}",
                "availability": availability,
                "device": device_info,
            }),
        ),
        (
            "button",
            "reboot",
            json!({
                "name": "Timelapse Camera Reboot",
                "unique_id": format!("{device}_reboot"),
                "command_topic": format!("{device}/command/reboot"),
                "availability": availability,
                "device": device_info,
            }),
        ),
        (
            "sensor",
            "uptime",
            json!({
                "name": "Timelapse Uptime",
                "unique_id": format!("{device}_uptime"),
                "state_topic": format!("{device}/state/uptime"),
                "value_template": "{{ value_json.state }}",
                "unit_of_measurement": "seconds",
                "availability": availability,
                "device": device_info,
            }),
        ),
        (
            "sensor",
            "last_capture",
            json!({
                "name": "Last Capture",
                "unique_id": format!("{device}_last_capture"),
                "state_topic": format!("{device}/state/last_capture"),
                "value_template": "{{ value_json.state }}",
                "device_class": "timestamp",
                "availability": availability,
                "device": device_info,
            }),
        ),
        (
            "camera",
            "image",
            json!({
                "name": "Latest Photo",
                "unique_id": format!("{device}_image"),
                "topic": format!("{device}/camera/image"),
                "image_encoding": "b64",
                "availability": availability,
                "device": device_info,
            }),
        ),
    ];

    for (component, entity, config) in entities {
        let topic =
            format!("{HOMEASSISTANT_DISCOVERY_PREFIX}/{component}/{device}/{entity}/config");
        if let Err(e) = client.try_publish(topic, QoS::AtLeastOnce, true, config.to_string()) {
            log_warning!("MQTT discovery publish for {entity} failed: {e}");
        }
    }
}

fn availability_topic(device: &str) -> String {
    format!("{device}/status")
}

impl StatusPublisher {
    /// Periodic status: uptime, enable flag, and the last capture if any.
    pub fn publish_status(&self, uptime_seconds: u64, enabled: bool, last: Option<&CaptureRecord>) {
        self.publish_state("uptime", json!(uptime_seconds));
        self.publish_state("capture", json!(if enabled { "ON" } else { "OFF" }));
        if let Some(record) = last {
            self.publish_state("last_capture", json!(record.time.to_rfc3339()));
        }
    }

    /// Announce a fresh capture: timestamp, path, and the image itself.
    pub fn publish_capture(&self, record: &CaptureRecord) {
        self.publish_state("last_capture", json!(record.time.to_rfc3339()));
        self.publish_state("latest_photo", json!(record.path.display().to_string()));

        match std::fs::read(&record.path) {
            Ok(bytes) => {
                let encoded = BASE64.encode(bytes);
                self.publish_raw(&format!("{}/camera/image", self.device), encoded);
            }
            Err(e) => log_warning!("Could not read {} for MQTT publish: {e}", record.path.display()),
        }
    }

    /// Publish `offline` and flush before a clean process exit.
    pub fn publish_offline(&self) {
        if !self.connected.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.client.try_publish(
            availability_topic(&self.device),
            QoS::AtLeastOnce,
            true,
            "offline",
        );
        let _ = self.client.disconnect();
    }

    // State topics carry `{"state": value}` (retained) to match the
    // discovery documents' value templates.
    fn publish_state(&self, entity: &str, state: serde_json::Value) {
        let topic = format!("{}/state/{entity}", self.device);
        self.publish_raw(&topic, json!({ "state": state }).to_string());
    }

    fn publish_raw(&self, topic: &str, payload: String) {
        if !self.connected.load(Ordering::SeqCst) {
            log_debug!("MQTT offline, dropping publish to {topic}");
            return;
        }
        if let Err(e) = self.client.try_publish(topic, QoS::AtLeastOnce, true, payload) {
            log_debug!("MQTT publish to {topic} failed: {e}");
        }
    }
}
