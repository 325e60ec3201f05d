pub mod palette_codec_image;
