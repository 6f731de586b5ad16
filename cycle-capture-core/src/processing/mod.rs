pub mod timing;
pub mod wav_encoder;
pub mod wav_format;
