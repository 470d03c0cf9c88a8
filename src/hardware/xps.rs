//! Newport XPS Motion Controller Link
//!
//! Reference: XPS Unified Programmer's Manual, TCP/IP command interface
//!
//! Protocol Overview:
//! - Transport: TCP, default port 5001
//! - Request: ASCII function call, e.g. `GroupKill(GROUP1)`
//! - Reply: `code,value,...,EndOfAPI`, received in 256-byte chunks until the
//!   `EndOfAPI` marker appears
//! - Output arguments are written as C-style placeholders (`int *`, `double *`)
//! - A non-zero code is translated to text with `ErrorStringGet(code,char *)`
//!
//! # Example Usage
//!
//! ```no_run
//! use fts_control::hardware::capabilities::{GroupMethod, MotionLink};
//! use fts_control::hardware::xps::XpsLink;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), fts_control::hardware::capabilities::LinkFault> {
//! let link = XpsLink::new();
//! link.open("192.168.254.254", 5001, Duration::from_millis(1000)).await?;
//! link.login("Administrator", "Administrator").await?;
//! link.group_action("GROUP3", GroupMethod::HomeSearch).await?;
//! println!("status {}", link.group_status("GROUP3").await?);
//! # Ok(())
//! # }
//! ```

use crate::hardware::capabilities::{
    GatheringChannel, GroupMethod, LinkFault, LinkResult, MotionLink, MoveMode, SGammaProfile,
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const END_OF_API: &str = "EndOfAPI";
const CHUNK_SIZE: usize = 256;

struct Connection {
    stream: TcpStream,
    timeout: Duration,
}

impl Connection {
    /// Send one request and collect the raw reply text.
    async fn exchange(&mut self, command: &str) -> LinkResult<String> {
        tokio::time::timeout(self.timeout, self.stream.write_all(command.as_bytes()))
            .await
            .map_err(|_| LinkFault::timeout(format!("send timed out: {command}")))?
            .map_err(|e| LinkFault::communication(format!("send failed: {e}")))?;

        let mut reply = String::new();
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let count = tokio::time::timeout(self.timeout, self.stream.read(&mut chunk))
                .await
                .map_err(|_| LinkFault::timeout(format!("receive timed out: {command}")))?
                .map_err(|e| LinkFault::communication(format!("receive failed: {e}")))?;
            if count == 0 {
                break;
            }
            reply.push_str(&String::from_utf8_lossy(&chunk[..count]));
            if reply.contains(END_OF_API) {
                break;
            }
        }
        Ok(reply)
    }
}

/// Split a controller reply into its result code and output values.
pub fn parse_reply(reply: &str) -> LinkResult<(i32, Vec<String>)> {
    let body = match reply.find(END_OF_API) {
        Some(end) => &reply[..end],
        None => {
            return Err(LinkFault::communication(format!(
                "reply not terminated by {END_OF_API}: {reply:?}"
            )))
        }
    };
    let body = body.trim().trim_end_matches(',');

    let mut fields = body.split(',').map(str::trim);
    let code = fields
        .next()
        .and_then(|c| c.parse::<i32>().ok())
        .ok_or_else(|| LinkFault::communication(format!("malformed reply: {reply:?}")))?;
    let values = fields.map(str::to_string).collect();
    Ok((code, values))
}

fn value_f64(values: &[String], index: usize, command: &str) -> LinkResult<f64> {
    values
        .get(index)
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| {
            LinkFault::communication(format!("{command}: missing numeric output {index}"))
        })
}

/// TCP link to a Newport XPS controller.
///
/// One connection per link. Calls are serialized by the connection mutex, so
/// a request is never sent while another is waiting for its reply.
pub struct XpsLink {
    connection: Mutex<Option<Connection>>,
}

impl XpsLink {
    /// Create an unconnected link. Call [`MotionLink::open`] before use.
    pub fn new() -> Self {
        Self {
            connection: Mutex::new(None),
        }
    }

    /// Execute one controller function and return its output values.
    ///
    /// Non-zero result codes are resolved to the controller's error string.
    /// A failed or timed-out exchange closes the connection; later calls
    /// fail until the link is opened again.
    async fn call(&self, command: &str) -> LinkResult<Vec<String>> {
        let mut guard = self.connection.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| LinkFault::communication("link is not open"))?;

        debug!(command, "XPS request");
        let (code, values) = match conn.exchange(command).await.and_then(|r| parse_reply(&r)) {
            Ok(parsed) => parsed,
            Err(fault) => {
                // A late reply would be read as the answer to the next call.
                warn!(command, error = %fault, "XPS exchange failed, dropping connection");
                *guard = None;
                return Err(fault);
            }
        };
        if code == 0 {
            return Ok(values);
        }

        let message = match conn
            .exchange(&format!("ErrorStringGet({code},char *)"))
            .await
            .and_then(|r| parse_reply(&r))
        {
            Ok((0, text)) if !text.is_empty() => text.join(","),
            Ok(_) => format!("controller error {code}"),
            Err(fault) => {
                warn!(command, error = %fault, "ErrorStringGet failed, dropping connection");
                *guard = None;
                format!("controller error {code}")
            }
        };
        debug!(command, code, %message, "XPS error reply");
        Err(LinkFault::new(code, message))
    }
}

impl Default for XpsLink {
    fn default() -> Self {
        Self::new()
    }
}

fn format_values(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl MotionLink for XpsLink {
    async fn open(&self, host: &str, port: u16, timeout: Duration) -> LinkResult<()> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| LinkFault::timeout(format!("connect to {host}:{port} timed out")))?
            .map_err(|e| LinkFault::communication(format!("connect to {host}:{port}: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| LinkFault::communication(e.to_string()))?;

        *self.connection.lock().await = Some(Connection { stream, timeout });
        info!(host, port, "XPS link open");
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> LinkResult<()> {
        self.call(&format!("Login({username},{password})")).await?;
        Ok(())
    }

    async fn firmware_version(&self) -> LinkResult<String> {
        let values = self.call("FirmwareVersionGet(char *)").await?;
        Ok(values.join(","))
    }

    async fn close(&self) -> LinkResult<()> {
        if let Some(mut conn) = self.connection.lock().await.take() {
            conn.stream
                .shutdown()
                .await
                .map_err(|e| LinkFault::communication(format!("close failed: {e}")))?;
            info!("XPS link closed");
        }
        Ok(())
    }

    async fn group_action(&self, group: &str, method: GroupMethod) -> LinkResult<()> {
        self.call(&format!("{}({group})", method.api_name())).await?;
        Ok(())
    }

    async fn move_group(
        &self,
        group: &str,
        axis_values: &[f64],
        mode: MoveMode,
    ) -> LinkResult<()> {
        self.call(&format!(
            "{}({group},{})",
            mode.api_name(),
            format_values(axis_values)
        ))
        .await?;
        Ok(())
    }

    async fn group_status(&self, group: &str) -> LinkResult<i32> {
        let command = format!("GroupStatusGet({group},int *)");
        let values = self.call(&command).await?;
        values
            .first()
            .and_then(|v| v.parse::<i32>().ok())
            .ok_or_else(|| LinkFault::communication(format!("{command}: missing status")))
    }

    async fn setpoint_position(&self, group: &str) -> LinkResult<f64> {
        let command = format!("GroupPositionSetpointGet({group},double *)");
        let values = self.call(&command).await?;
        value_f64(&values, 0, &command)
    }

    async fn gathering_configure(&self, channels: &[GatheringChannel]) -> LinkResult<()> {
        let list = channels
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.call(&format!("GatheringConfigurationSet({list})")).await?;
        Ok(())
    }

    async fn gathering_run(&self, dataset_count: u32, interval: u32) -> LinkResult<()> {
        self.call(&format!("GatheringRun({dataset_count},{interval})"))
            .await?;
        Ok(())
    }

    async fn gathering_stop(&self) -> LinkResult<()> {
        self.call("GatheringStop()").await?;
        Ok(())
    }

    async fn gathering_stop_and_save(&self) -> LinkResult<()> {
        self.call("GatheringStopAndSave()").await?;
        Ok(())
    }

    async fn positioner_max_velocity_acceleration(
        &self,
        positioner: &str,
    ) -> LinkResult<(f64, f64)> {
        let command =
            format!("PositionerMaximumVelocityAndAccelerationGet({positioner},double *,double *)");
        let values = self.call(&command).await?;
        Ok((
            value_f64(&values, 0, &command)?,
            value_f64(&values, 1, &command)?,
        ))
    }

    async fn positioner_user_travel_limits(&self, positioner: &str) -> LinkResult<(f64, f64)> {
        let command = format!("PositionerUserTravelLimitsGet({positioner},double *,double *)");
        let values = self.call(&command).await?;
        Ok((
            value_f64(&values, 0, &command)?,
            value_f64(&values, 1, &command)?,
        ))
    }

    async fn sgamma_parameters(&self, positioner: &str) -> LinkResult<SGammaProfile> {
        let command = format!(
            "PositionerSGammaParametersGet({positioner},double *,double *,double *,double *)"
        );
        let values = self.call(&command).await?;
        Ok(SGammaProfile {
            velocity: value_f64(&values, 0, &command)?,
            acceleration: value_f64(&values, 1, &command)?,
            min_jerk_time: value_f64(&values, 2, &command)?,
            max_jerk_time: value_f64(&values, 3, &command)?,
        })
    }

    async fn set_sgamma_parameters(
        &self,
        positioner: &str,
        profile: &SGammaProfile,
    ) -> LinkResult<()> {
        self.call(&format!(
            "PositionerSGammaParametersSet({positioner},{})",
            format_values(&[
                profile.velocity,
                profile.acceleration,
                profile.min_jerk_time,
                profile.max_jerk_time,
            ])
        ))
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn parse_success_with_values() {
        let (code, values) = parse_reply("0,11,EndOfAPI").unwrap();
        assert_eq!(code, 0);
        assert_eq!(values, vec!["11"]);
    }

    #[test]
    fn parse_error_code_without_values() {
        let (code, values) = parse_reply("-22,EndOfAPI").unwrap();
        assert_eq!(code, -22);
        assert!(values.is_empty());
    }

    #[test]
    fn parse_rejects_unterminated_reply() {
        let fault = parse_reply("0,1.5,").unwrap_err();
        assert_eq!(fault.code, LinkFault::COMMUNICATION);
    }

    #[test]
    fn parse_rejects_non_numeric_code() {
        assert!(parse_reply("OK,EndOfAPI").is_err());
    }

    #[test]
    fn values_are_comma_joined() {
        assert_eq!(format_values(&[10.0, 2.5, -1.0]), "10,2.5,-1");
    }

    #[tokio::test]
    async fn call_on_unopened_link_is_a_communication_fault() {
        let link = XpsLink::new();
        let fault = link.group_status("GROUP1").await.unwrap_err();
        assert_eq!(fault.code, LinkFault::COMMUNICATION);
    }

    /// Scripted controller answering fixed replies in order.
    async fn scripted_controller(replies: Vec<&'static str>) -> (u16, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            for reply in replies {
                let mut buf = [0u8; 512];
                let n = socket.read(&mut buf).await.unwrap();
                seen.push(String::from_utf8_lossy(&buf[..n]).to_string());
                socket.write_all(reply.as_bytes()).await.unwrap();
            }
            seen
        });
        (port, handle)
    }

    #[tokio::test]
    async fn error_reply_is_resolved_to_device_message() {
        let (port, server) =
            scripted_controller(vec!["-22,EndOfAPI", "0,Not allowed action,EndOfAPI"]).await;

        let link = XpsLink::new();
        link.open("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        let fault = link
            .group_action("GROUP3", GroupMethod::MoveAbort)
            .await
            .unwrap_err();

        assert!(fault.is_not_allowed_action());
        assert_eq!(fault.message, "Not allowed action");

        let seen = server.await.unwrap();
        assert_eq!(seen[0], "GroupMoveAbort(GROUP3)");
        assert_eq!(seen[1], "ErrorStringGet(-22,char *)");
    }

    #[tokio::test]
    async fn late_reply_is_not_read_by_the_next_call() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 512];
            socket.read(&mut buf).await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = socket.write_all(b"0,EndOfAPI").await;
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(b"0,44,EndOfAPI").await;
        });

        let link = XpsLink::new();
        link.open("127.0.0.1", port, Duration::from_millis(100))
            .await
            .unwrap();
        let fault = link
            .move_group("GROUP3", &[10.0], MoveMode::Absolute)
            .await
            .unwrap_err();
        assert_eq!(fault.code, LinkFault::TIMEOUT);

        tokio::time::sleep(Duration::from_millis(300)).await;
        let fault = link.group_status("GROUP3").await.unwrap_err();
        assert_eq!(fault.code, LinkFault::COMMUNICATION);
        assert!(fault.message.contains("not open"));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn status_and_setpoint_replies_are_decoded() {
        let (port, server) =
            scripted_controller(vec!["0,11,EndOfAPI", "0,25.5,EndOfAPI"]).await;

        let link = XpsLink::new();
        link.open("127.0.0.1", port, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(link.group_status("GROUP3").await.unwrap(), 11);
        assert_eq!(link.setpoint_position("GROUP3").await.unwrap(), 25.5);

        let seen = server.await.unwrap();
        assert_eq!(seen[0], "GroupStatusGet(GROUP3,int *)");
        assert_eq!(seen[1], "GroupPositionSetpointGet(GROUP3,double *)");
    }
}
