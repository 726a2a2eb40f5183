//! End-to-end pipeline behavior on the CPU reference device.

use motion_core::{
    DecompMethod, DeviceConfig, FrameFormat, InputVideoSettings, MotionConfig, MotionDetector,
    MotionError,
};

fn video(width: u32, height: u32, frame_format: FrameFormat) -> InputVideoSettings {
    InputVideoSettings {
        width,
        height,
        frame_format,
    }
}

fn config(
    gaussian_size: u32,
    scale_denominator: u32,
    bg: u32,
    mvt: u32,
    min_pixel_diff: u8,
    min_changed_pixels: f32,
) -> MotionConfig {
    MotionConfig {
        gaussian_size,
        scale_denominator,
        bg_stabil_length: bg,
        motion_stabil_length: mvt,
        min_pixel_diff,
        min_changed_pixels,
        decomp_method: DecompMethod::Accurate,
    }
}

fn detector(video: InputVideoSettings, config: MotionConfig) -> MotionDetector {
    MotionDetector::new(video, config, DeviceConfig::Cpu, None).unwrap()
}

/// Allowed per-pixel deviation from hand-computed values (byte rounding).
const ERROR_MARGIN: i32 = 3;

fn assert_pixels_near(actual: &[u8], expected: &[i32]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (i32::from(a) - e).abs() < ERROR_MARGIN,
            "pixel {i}: got {a}, expected {e}"
        );
    }
}

mod construction {
    use super::*;

    #[test]
    fn accepts_a_valid_configuration() {
        let det = detector(
            video(640, 480, FrameFormat::Rgb),
            config(1, 1, 10, 5, 5, 0.5),
        );
        assert_eq!(det.scaled_geometry().scaled_width, 638);
    }

    #[test]
    fn rejects_invalid_settings() {
        let valid_video = video(640, 480, FrameFormat::Rgb);

        let cases = [
            config(1, 0, 10, 5, 0, 0.5),
            config(1, 1, 0, 5, 0, 0.5),
            config(1, 1, 10, 0, 0, 0.5),
            config(1, 1, 10, 5, 0, -0.5),
            config(1, 1, 10, 5, 0, 1.1),
        ];
        for motion in cases {
            let err =
                MotionDetector::new(valid_video, motion, DeviceConfig::Cpu, None).unwrap_err();
            assert!(matches!(err, MotionError::InvalidArgument(_)), "{motion:?}");
        }

        // Degenerate dimensions.
        for bad_video in [
            video(0, 480, FrameFormat::Rgb),
            video(640, 0, FrameFormat::Rgb),
        ] {
            let err = MotionDetector::new(
                bad_video,
                config(1, 1, 10, 5, 0, 0.5),
                DeviceConfig::Cpu,
                None,
            )
            .unwrap_err();
            assert!(matches!(err, MotionError::InvalidArgument(_)));
        }
    }

    #[test]
    fn rejects_kernel_wider_than_the_frame() {
        // g = 3 * 2 = 6 exceeds the 3-pixel edges.
        let err = MotionDetector::new(
            video(3, 3, FrameFormat::Rgb),
            config(1, 2, 10, 5, 0, 0.1),
            DeviceConfig::Cpu,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MotionError::InvalidArgument(_)));
    }

    #[test]
    fn surfaces_device_unavailable() {
        let err = MotionDetector::new(
            video(3, 3, FrameFormat::Gray),
            config(0, 1, 1, 1, 5, 0.0),
            DeviceConfig::Specific(usize::MAX),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, MotionError::DeviceUnavailable(_)));
    }

    #[test]
    fn exposes_the_construction_settings() {
        let det = detector(video(3, 3, FrameFormat::Gray), config(0, 1, 2, 1, 7, 0.25));
        assert_eq!(det.input_video_settings().width, 3);
        assert_eq!(det.motion_config().min_pixel_diff, 7);
        assert_eq!(det.device_config(), DeviceConfig::Cpu);
        assert!(det.device_name().contains("cpu"));
    }
}

mod blur_and_scale {
    use super::*;

    #[test]
    fn no_blur_no_scale_reduces_rgb_to_luma() {
        // Lumas: 255, 170, 170, 170, 85, 85, 85, 0, 255.
        #[rustfmt::skip]
        let frame: Vec<u8> = vec![
            255, 255, 255,   255, 255, 0,   0, 255, 255,
            255, 0, 255,     255, 0, 0,     0, 255, 0,
            0, 0, 255,       0, 0, 0,       255, 255, 255,
        ];
        let mut det = detector(video(3, 3, FrameFormat::Rgb), config(0, 1, 10, 2, 0, 0.0));
        let scaled = det.blur_and_scale(&frame).unwrap();
        assert_pixels_near(&scaled, &[255, 170, 170, 170, 85, 85, 85, 0, 255]);
    }

    #[test]
    fn no_blur_no_scale_passes_gray_through_unchanged() {
        let frame: Vec<u8> = (0..9).map(|v| v * 20).collect();
        let mut det = detector(video(3, 3, FrameFormat::Gray), config(0, 1, 10, 2, 0, 0.0));
        let scaled = det.blur_and_scale(&frame).unwrap();
        assert_eq!(scaled, frame);
    }

    #[test]
    fn third_scale_averages_the_whole_frame() {
        let frame: Vec<u8> = vec![12, 24, 36, 48, 60, 72, 84, 96, 108];
        let mut det = detector(video(3, 3, FrameFormat::Gray), config(0, 3, 10, 2, 0, 0.0));
        let scaled = det.blur_and_scale(&frame).unwrap();
        assert_pixels_near(&scaled, &[60]);
    }

    #[test]
    fn half_scale_averages_two_by_two_blocks() {
        #[rustfmt::skip]
        let frame: Vec<u8> = vec![
            0,   16,  32,  48,
            64,  80,  96,  112,
            128, 144, 160, 176,
            192, 208, 224, 240,
        ];
        let mut det = detector(video(4, 4, FrameFormat::Gray), config(0, 2, 10, 2, 0, 0.0));
        let scaled = det.blur_and_scale(&frame).unwrap();
        assert_pixels_near(&scaled, &[40, 72, 168, 200]);
    }

    #[test]
    fn gaussian_blur_of_a_linear_ramp_keeps_the_center() {
        // A separable blur of a linear ramp reproduces the center value.
        let frame: Vec<u8> = vec![10, 20, 30, 40, 50, 60, 70, 80, 90];
        let mut det = detector(video(3, 3, FrameFormat::Gray), config(1, 1, 10, 2, 0, 0.0));
        let scaled = det.blur_and_scale(&frame).unwrap();
        assert_pixels_near(&scaled, &[50]);
    }
}

mod stabilization {
    use super::*;

    #[test]
    fn identical_frames_yield_no_motion() {
        let white = vec![255u8; 27];
        let mut det = detector(video(3, 3, FrameFormat::Rgb), config(0, 1, 1, 1, 5, 0.0));

        // First frame stands out against the zeroed warm-up history.
        assert!(det.detect_on_decompressed_frame(&white).unwrap());
        // The second is compared against an identical background.
        assert!(!det.detect_on_decompressed_frame(&white).unwrap());
    }

    #[test]
    fn black_then_grey_crosses_the_pixel_threshold() {
        let black = vec![0u8; 27];
        let grey = vec![127u8; 27];

        // The means differ by 127, which beats 124...
        let mut det = detector(video(3, 3, FrameFormat::Rgb), config(0, 1, 1, 1, 124, 0.0));
        det.detect_on_decompressed_frame(&black).unwrap();
        assert!(det.detect_on_decompressed_frame(&grey).unwrap());

        // ...but not 130.
        let mut det = detector(video(3, 3, FrameFormat::Rgb), config(0, 1, 1, 1, 130, 0.0));
        det.detect_on_decompressed_frame(&black).unwrap();
        assert!(!det.detect_on_decompressed_frame(&grey).unwrap());
    }

    #[test]
    fn background_averaging_dilutes_an_old_frame() {
        // One black frame followed by ten white ones: the background mean is
        // 229.5 against a movement mean of 255, a difference of 25.5.
        for (threshold, expected) in [(22u8, true), (28u8, false)] {
            let mut det = detector(
                video(3, 3, FrameFormat::Rgb),
                config(0, 1, 10, 1, threshold, 0.0),
            );
            det.detect_on_decompressed_frame(&vec![0u8; 27]).unwrap();
            let mut verdict = false;
            for _ in 0..10 {
                verdict = det.detect_on_decompressed_frame(&vec![255u8; 27]).unwrap();
            }
            assert_eq!(verdict, expected, "threshold {threshold}");
        }
    }

    #[test]
    fn movement_averaging_dilutes_a_new_frame() {
        // Ten black frames followed by one white: the movement mean is 25.5
        // against a background mean of 0.
        for (threshold, expected) in [(22u8, true), (28u8, false)] {
            let mut det = detector(
                video(3, 3, FrameFormat::Rgb),
                config(0, 1, 1, 10, threshold, 0.0),
            );
            for _ in 0..10 {
                det.detect_on_decompressed_frame(&vec![0u8; 27]).unwrap();
            }
            let verdict = det.detect_on_decompressed_frame(&vec![255u8; 27]).unwrap();
            assert_eq!(verdict, expected, "threshold {threshold}");
        }
    }

    #[test]
    fn changed_fraction_is_compared_against_the_floor_threshold() {
        let all_white = vec![255u8; 9];
        let mut half_changed = vec![255u8; 9];
        half_changed[..5].fill(0);

        // 5 of 9 pixels change; 5/9 clears a 0.5 fraction...
        let mut det = detector(video(3, 3, FrameFormat::Gray), config(0, 1, 1, 1, 5, 0.5));
        det.detect_on_decompressed_frame(&all_white).unwrap();
        assert!(det.detect_on_decompressed_frame(&half_changed).unwrap());

        // ...but not 0.6 (threshold floors to 5, and 5 > 5 fails).
        let mut det = detector(video(3, 3, FrameFormat::Gray), config(0, 1, 1, 1, 5, 0.6));
        det.detect_on_decompressed_frame(&all_white).unwrap();
        assert!(!det.detect_on_decompressed_frame(&half_changed).unwrap());
    }

    #[test]
    fn full_fraction_never_detects() {
        // f = 1 demands strictly more than every pixel, which cannot happen.
        let mut det = detector(video(3, 3, FrameFormat::Gray), config(0, 1, 1, 1, 5, 1.0));
        det.detect_on_decompressed_frame(&vec![255u8; 9]).unwrap();
        assert!(!det.detect_on_decompressed_frame(&vec![0u8; 9]).unwrap());
    }

    #[test]
    fn uniform_stream_settles_to_silence() {
        // Feed the same frame N + 1 times; at steady state both reservoirs
        // hold identical windows and the mask is empty even at threshold 0.
        let frame: Vec<u8> = (0..9).map(|v| v * 30).collect();
        let mut det = detector(video(3, 3, FrameFormat::Gray), config(0, 1, 2, 2, 0, 0.0));

        let slots = 2 + 2 + 1;
        let mut verdict = true;
        for _ in 0..=slots {
            verdict = det.detect_on_decompressed_frame(&frame).unwrap();
        }
        assert!(!verdict);
    }

    #[test]
    fn identical_detectors_agree_on_every_frame() {
        let settings = video(9, 9, FrameFormat::Gray);
        let motion = config(1, 2, 3, 2, 10, 0.2);
        let mut first = detector(settings, motion);
        let mut second = detector(settings, motion);

        for i in 0..8u32 {
            let frame: Vec<u8> = (0..81u32).map(|j| ((i * 37 + j * 11) % 256) as u8).collect();
            let a = first.detect_on_decompressed_frame(&frame).unwrap();
            let b = second.detect_on_decompressed_frame(&frame).unwrap();
            assert_eq!(a, b, "frame {i}");
        }
    }
}

mod error_handling {
    use super::*;

    #[test]
    fn wrong_frame_length_is_rejected_and_retryable() {
        let mut det = detector(video(3, 3, FrameFormat::Gray), config(0, 1, 1, 1, 5, 0.0));

        let err = det.detect_on_decompressed_frame(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, MotionError::InvalidArgument(_)));

        // The failed call mutated nothing; the detector keeps working.
        det.detect_on_decompressed_frame(&vec![0u8; 9]).unwrap();
    }

    #[test]
    fn decode_failure_is_surfaced_and_retryable() {
        let mut det = detector(video(8, 8, FrameFormat::Gray), config(0, 1, 1, 1, 5, 0.0));

        let err = det.detect_on_frame(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        assert!(matches!(err, MotionError::Decode(_)));

        det.detect_on_decompressed_frame(&vec![128u8; 64]).unwrap();
    }
}

mod jpeg_round_trip {
    use super::*;
    use image::codecs::jpeg::JpegEncoder;
    use image::ExtendedColorType;

    fn encode_gray(width: u32, height: u32, value: u8) -> Vec<u8> {
        let pixels = vec![value; (width * height) as usize];
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, 95)
            .encode(&pixels, width, height, ExtendedColorType::L8)
            .unwrap();
        out
    }

    #[test]
    fn detects_a_scene_change_through_the_decoder() {
        let mut det = detector(video(8, 8, FrameFormat::Gray), config(0, 1, 1, 1, 5, 0.0));
        let white = encode_gray(8, 8, 255);
        let black = encode_gray(8, 8, 0);

        det.detect_on_frame(&white).unwrap();
        assert!(!det.detect_on_frame(&white).unwrap());
        assert!(det.detect_on_frame(&black).unwrap());
    }

    #[test]
    fn mismatched_stream_dimensions_fail_decode() {
        let mut det = detector(video(8, 8, FrameFormat::Gray), config(0, 1, 1, 1, 5, 0.0));
        let wrong = encode_gray(16, 16, 128);
        let err = det.detect_on_frame(&wrong).unwrap_err();
        assert!(matches!(err, MotionError::Decode(_)));
    }
}
