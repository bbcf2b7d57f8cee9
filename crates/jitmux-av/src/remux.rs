//! Engine argument construction for probing and chunk remuxing.

use crate::policy::ContainerPolicy;
use jitmux_common::StreamId;

/// Audio encoding settings applied when an audio stream is transcoded.
const AUDIO_CHANNELS: &str = "2";
const AUDIO_SAMPLE_RATE: &str = "48000";
const AUDIO_BITRATE: &str = "192k";

/// Arguments for `-i <input>`: the engine prints the container summary and
/// stops because no output is given.
pub fn probe_args(input: &str) -> Vec<String> {
    vec!["-hide_banner".to_string(), "-i".to_string(), input.to_string()]
}

/// A stream mapped into the chunk output.
#[derive(Debug, Clone)]
pub struct MappedStream<'a> {
    pub id: &'a StreamId,
    pub policy: &'a ContainerPolicy,
}

/// Builder for the arguments of one chunk remux.
///
/// The chunk keeps the source timestamps (`-copyts -start_at_zero`) so
/// consecutive chunks line up on the playback timeline, copies the video
/// stream untouched and writes a zero-delay MPEG-TS.
#[derive(Debug, Clone)]
pub struct RemuxArgs<'a> {
    input: &'a str,
    output: &'a str,
    seek_secs: f64,
    duration_secs: Option<f64>,
    video: Option<MappedStream<'a>>,
    audio: Option<MappedStream<'a>>,
}

impl<'a> RemuxArgs<'a> {
    pub fn new(input: &'a str, output: &'a str, seek_secs: f64) -> Self {
        Self {
            input,
            output,
            seek_secs,
            duration_secs: None,
            video: None,
            audio: None,
        }
    }

    pub fn duration(mut self, secs: Option<f64>) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn video(mut self, id: &'a StreamId, policy: &'a ContainerPolicy) -> Self {
        self.video = Some(MappedStream { id, policy });
        self
    }

    pub fn audio(mut self, id: &'a StreamId, policy: &'a ContainerPolicy) -> Self {
        self.audio = Some(MappedStream { id, policy });
        self
    }

    pub fn build(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-ss".into(),
            self.seek_secs.to_string(),
        ];
        if let Some(duration) = self.duration_secs {
            args.extend(["-t".into(), duration.to_string()]);
        }
        args.extend([
            "-copyts".into(),
            "-start_at_zero".into(),
            "-i".into(),
            self.input.to_string(),
        ]);

        if let Some(video) = &self.video {
            args.extend([
                "-map".into(),
                video.id.to_string(),
                "-vcodec".into(),
                "copy".into(),
            ]);
        }

        if let Some(audio) = &self.audio {
            args.extend(["-map".into(), audio.id.to_string()]);
            match audio.policy.target_codec.filter(|_| audio.policy.convert) {
                Some(codec) => args.extend([
                    "-strict".into(),
                    "-2".into(),
                    "-ac".into(),
                    AUDIO_CHANNELS.into(),
                    "-ar".into(),
                    AUDIO_SAMPLE_RATE.into(),
                    "-b:a".into(),
                    AUDIO_BITRATE.into(),
                    "-acodec".into(),
                    codec.encoder().into(),
                ]),
                None => args.extend(["-acodec".into(), "copy".into()]),
            }
        }

        args.extend([
            "-f".into(),
            "mpegts".into(),
            "-muxdelay".into(),
            "0".into(),
            "-muxpreload".into(),
            "0".into(),
            self.output.to_string(),
        ]);
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{classify_audio, classify_video};

    fn id(s: &str) -> StreamId {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_chunk_with_copied_audio() {
        let video = classify_video("h264 (High)").unwrap();
        let audio = classify_audio("aac (LC), 48000 Hz").unwrap();
        let (v, a) = (id("0:0"), id("0:1"));

        let args = RemuxArgs::new("/input/movie.mkv", "/output/video", 0.0)
            .duration(Some(10.1))
            .video(&v, &video)
            .audio(&a, &audio)
            .build();

        assert_eq!(
            args.join(" "),
            "-hide_banner -ss 0 -t 10.1 -copyts -start_at_zero -i /input/movie.mkv \
             -map 0:0 -vcodec copy -map 0:1 -acodec copy \
             -f mpegts -muxdelay 0 -muxpreload 0 /output/video"
        );
    }

    #[test]
    fn test_transcoded_audio() {
        let video = classify_video("h264").unwrap();
        let audio = classify_audio("eac3, 48000 Hz, 5.1(side)").unwrap();
        let (v, a) = (id("0:0"), id("0:2"));

        let args = RemuxArgs::new("in.mkv", "out.ts", 9.9)
            .duration(Some(10.1))
            .video(&v, &video)
            .audio(&a, &audio)
            .build();
        let joined = args.join(" ");

        assert!(joined.starts_with("-hide_banner -ss 9.9 -t 10.1 "));
        assert!(joined.contains(
            "-map 0:2 -strict -2 -ac 2 -ar 48000 -b:a 192k -acodec aac -f mpegts"
        ));
    }

    #[test]
    fn test_without_duration_or_audio() {
        let video = classify_video("h264").unwrap();
        let v = id("0:0");

        let args = RemuxArgs::new("in.mkv", "out.ts", 42.5)
            .video(&v, &video)
            .build();

        assert!(!args.contains(&"-t".to_string()));
        assert!(!args.contains(&"-acodec".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.ts"));
    }

    #[test]
    fn test_probe_args() {
        assert_eq!(probe_args("/in/a.mkv"), vec!["-hide_banner", "-i", "/in/a.mkv"]);
    }
}
