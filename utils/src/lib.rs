pub mod audio;
pub mod device;
pub mod playback;
pub mod recorder;
pub mod streamer;
