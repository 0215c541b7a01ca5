//! Telephony collaborator: device interface and a simulated device.

pub mod device;
pub mod simulated;

pub use device::{
    Codec, ConnectParams, Connection, DeviceError, DeviceEvent, DeviceEvents, DeviceFactory,
    DeviceOptions, TelephonyDevice,
};
pub use simulated::SimulatedDeviceFactory;
