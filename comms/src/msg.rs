use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();

type Step = u64;
const STEP_SIZE: usize = size_of::<Step>();

/// The payload data for the `Data` variant of the `Msg` enum.
///
/// `Gradient` flows worker -> server, `Weights` flows server -> worker and
/// carries the global step at snapshot time.
#[derive(Debug)]
pub enum Payload<'a> {
    Gradient(&'a [f32]),
    Weights { step: u64, params: &'a mut [f32] },
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Join { worker_id: usize },
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    fn buf_is_too_small<T>(size: usize, needed: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {needed} bytes"),
        ))
    }

    fn invalid_kind_byte<T>(byte: u8) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind byte {byte}"),
        ))
    }

    fn unaligned_payload<T>(err: bytemuck::PodCastError) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The payload region is not a valid f32 slice: {err}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                let header = (0 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                let header = (1 as Header).to_be_bytes();
                buf.extend_from_slice(&header);

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, &cmd).unwrap();
                None
            }
            Msg::Data(Payload::Gradient(grad)) => {
                let header = (2 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                Some(bytemuck::cast_slice::<f32, u8>(grad))
            }
            Msg::Data(Payload::Weights { step, params }) => {
                let header = (3 as Header).to_be_bytes();
                buf.extend_from_slice(&header);
                buf.extend_from_slice(&step.to_be_bytes());
                Some(bytemuck::cast_slice::<f32, u8>(params.as_ref()))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len(), HEADER_SIZE);
        }

        let (kind_buf, rest) = buf.split_at_mut(HEADER_SIZE);

        // SAFETY: We splitted the buffer to be of size `HEADER_SIZE` just above.
        let kind = Header::from_be_bytes(kind_buf.try_into().unwrap()) as u8;

        match kind {
            0 => {
                let string = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            1 => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            2 => {
                let grad = bytemuck::try_cast_slice(rest)
                    .or_else(|err| Self::unaligned_payload(err))?;

                Ok(Self::Data(Payload::Gradient(grad)))
            }
            3 => {
                if rest.len() < STEP_SIZE {
                    return Self::buf_is_too_small(rest.len(), STEP_SIZE);
                }

                let (step_buf, params_buf) = rest.split_at_mut(STEP_SIZE);

                // SAFETY: We splitted the buffer to be of size `STEP_SIZE` just above.
                let step = Step::from_be_bytes((&*step_buf).try_into().unwrap());
                let params = bytemuck::try_cast_slice_mut(params_buf)
                    .or_else(|err| Self::unaligned_payload(err))?;

                Ok(Self::Data(Payload::Weights { step, params }))
            }
            byte => Self::invalid_kind_byte(byte),
        }
    }
}
