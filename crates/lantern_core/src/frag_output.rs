//! Fragment output layouts for the sprite G-buffer pass.
//!
//! A fragment output is a fixed-order aggregate of `vec4<f32>` channels, one
//! per color attachment of the render pass:
//!
//! | Type                    | Channels                       | Attachments |
//! |-------------------------|--------------------------------|-------------|
//! | [`GBufferOutput`]       | diffuse, normal, light         | 0, 1, 2     |
//! | [`ScreenGBufferOutput`] | output, diffuse, normal, light | 0, 1, 2, 3  |
//!
//! [`ScreenGBufferOutput`] writes the unlit color straight into the view
//! target (attachment 0) alongside the G-buffer, so every G-buffer channel
//! sits one slot higher than in [`GBufferOutput`].
//!
//! The Rust types mirror the WGSL structs byte for byte: each channel is 16
//! bytes and the struct has no padding. [`validate_layout`] checks this, and
//! [`wgsl_struct`] renders the matching shader declaration.

use std::fmt::Write;
use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

/// Four packed single-precision components (RGBA or XYZW).
pub type Float4 = [f32; 4];

/// Byte width of one output channel.
pub const CHANNEL_SIZE: usize = size_of::<Float4>();

/// What a channel holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelRole {
    /// Final unlit color written to the view target.
    Output,
    /// Surface albedo.
    Diffuse,
    /// Surface normal packed into `[0, 1]`.
    Normal,
    /// Accumulated light.
    Light,
}

impl ChannelRole {
    /// Field name used in Rust and WGSL.
    pub fn name(self) -> &'static str {
        match self {
            ChannelRole::Output => "output",
            ChannelRole::Diffuse => "diffuse",
            ChannelRole::Normal => "normal",
            ChannelRole::Light => "light",
        }
    }
}

/// One channel of a fragment output and the color attachment it is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputChannel {
    pub role: ChannelRole,
    pub attachment: u32,
}

impl OutputChannel {
    pub const fn new(role: ChannelRole, attachment: u32) -> Self {
        Self { role, attachment }
    }

    pub fn name(&self) -> &'static str {
        self.role.name()
    }
}

/// A `#[repr(C)]` fragment output whose fields are [`Float4`] channels in
/// attachment order.
pub trait FragmentOutputLayout: Pod {
    /// Channels in declaration order.
    const CHANNELS: &'static [OutputChannel];

    /// Shader def that selects this layout's struct in the sprite shader.
    const SHADER_DEF: Option<&'static str>;

    /// The value viewed as its attachment slots.
    fn attachments(&self) -> &[Float4] {
        bytemuck::try_cast_slice(std::slice::from_ref(self)).unwrap_or(&[])
    }

    /// Channel value written to color attachment `index`.
    fn attachment(&self, index: u32) -> Option<Float4> {
        self.attachments().get(index as usize).copied()
    }

    /// Serialized bytes of color attachment `index`.
    fn attachment_bytes(&self, index: u32) -> Option<&[u8]> {
        let start = index as usize * CHANNEL_SIZE;
        bytemuck::bytes_of(self).get(start..start + CHANNEL_SIZE)
    }

    /// Attachment index bound to `role`, if the layout has that channel.
    fn attachment_for(role: ChannelRole) -> Option<u32> {
        Self::CHANNELS
            .iter()
            .find(|channel| channel.role == role)
            .map(|channel| channel.attachment)
    }

    /// Number of color attachments the layout writes.
    fn attachment_count() -> usize {
        Self::CHANNELS.len()
    }
}

/// Offscreen G-buffer output.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GBufferOutput {
    pub diffuse: Float4,
    pub normal: Float4,
    pub light: Float4,
}

/// Older name of [`GBufferOutput`]; the two layouts were identical.
pub type FragOutput = GBufferOutput;

impl FragmentOutputLayout for GBufferOutput {
    const CHANNELS: &'static [OutputChannel] = &[
        OutputChannel::new(ChannelRole::Diffuse, 0),
        OutputChannel::new(ChannelRole::Normal, 1),
        OutputChannel::new(ChannelRole::Light, 2),
    ];

    const SHADER_DEF: Option<&'static str> = None;
}

/// G-buffer output with the view target bound at attachment 0.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ScreenGBufferOutput {
    pub output: Float4,
    pub diffuse: Float4,
    pub normal: Float4,
    pub light: Float4,
}

impl ScreenGBufferOutput {
    /// Prepend `output` to an offscreen G-buffer value.
    pub fn from_gbuffer(output: Float4, gbuffer: GBufferOutput) -> Self {
        Self {
            output,
            diffuse: gbuffer.diffuse,
            normal: gbuffer.normal,
            light: gbuffer.light,
        }
    }

    /// The G-buffer part without the view target channel.
    pub fn gbuffer(&self) -> GBufferOutput {
        GBufferOutput {
            diffuse: self.diffuse,
            normal: self.normal,
            light: self.light,
        }
    }
}

impl FragmentOutputLayout for ScreenGBufferOutput {
    const CHANNELS: &'static [OutputChannel] = &[
        OutputChannel::new(ChannelRole::Output, 0),
        OutputChannel::new(ChannelRole::Diffuse, 1),
        OutputChannel::new(ChannelRole::Normal, 2),
        OutputChannel::new(ChannelRole::Light, 3),
    ];

    const SHADER_DEF: Option<&'static str> = Some("SCREEN_OUTPUT");
}

/// Reasons a type fails [`validate_layout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// The layout declares no channels.
    Empty,
    /// Channel at `position` is bound to a different attachment.
    NonContiguous { position: usize, attachment: u32 },
    /// Struct size differs from `channels * 16`, so it has padding or stray fields.
    SizeMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutError::Empty => write!(f, "Layout declares no channels"),
            LayoutError::NonContiguous {
                position,
                attachment,
            } => write!(
                f,
                "Channel {} is bound to attachment {}, expected {}",
                position, attachment, position
            ),
            LayoutError::SizeMismatch { expected, actual } => write!(
                f,
                "Layout is {} bytes, expected {} bytes",
                actual, expected
            ),
        }
    }
}

impl std::error::Error for LayoutError {}

/// Check that `L` is `channels * 16` bytes and its attachments run `0..n` in
/// declaration order.
pub fn validate_layout<L: FragmentOutputLayout>() -> Result<(), LayoutError> {
    if L::CHANNELS.is_empty() {
        return Err(LayoutError::Empty);
    }

    for (position, channel) in L::CHANNELS.iter().enumerate() {
        if channel.attachment != position as u32 {
            return Err(LayoutError::NonContiguous {
                position,
                attachment: channel.attachment,
            });
        }
    }

    let expected = L::CHANNELS.len() * CHANNEL_SIZE;
    let actual = size_of::<L>();
    if expected != actual {
        return Err(LayoutError::SizeMismatch { expected, actual });
    }

    Ok(())
}

/// True when `A` and `B` have the same channels, order, attachments and size.
pub fn same_layout<A: FragmentOutputLayout, B: FragmentOutputLayout>() -> bool {
    size_of::<A>() == size_of::<B>() && A::CHANNELS == B::CHANNELS
}

/// Render the WGSL struct declaration for `L`.
pub fn wgsl_struct<L: FragmentOutputLayout>(name: &str) -> String {
    let mut source = format!("struct {} {{\n", name);
    for channel in L::CHANNELS {
        // Writing to a String cannot fail.
        let _ = writeln!(
            source,
            "    @location({}) {}: vec4<f32>,",
            channel.attachment,
            channel.name()
        );
    }
    source.push('}');
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Same shape as `GBufferOutput`, declared independently.
    #[repr(C)]
    #[derive(Copy, Clone, Pod, Zeroable)]
    struct MirroredOutput {
        diffuse: Float4,
        normal: Float4,
        light: Float4,
    }

    impl FragmentOutputLayout for MirroredOutput {
        const CHANNELS: &'static [OutputChannel] = GBufferOutput::CHANNELS;
        const SHADER_DEF: Option<&'static str> = None;
    }

    /// Declares attachments out of order.
    #[repr(C)]
    #[derive(Copy, Clone, Pod, Zeroable)]
    struct SwappedOutput {
        normal: Float4,
        diffuse: Float4,
    }

    impl FragmentOutputLayout for SwappedOutput {
        const CHANNELS: &'static [OutputChannel] = &[
            OutputChannel::new(ChannelRole::Normal, 1),
            OutputChannel::new(ChannelRole::Diffuse, 0),
        ];
        const SHADER_DEF: Option<&'static str> = None;
    }

    /// Carries a trailing scalar that no attachment accounts for.
    #[repr(C)]
    #[derive(Copy, Clone, Pod, Zeroable)]
    struct PaddedOutput {
        diffuse: Float4,
        extra: [f32; 4],
    }

    impl FragmentOutputLayout for PaddedOutput {
        const CHANNELS: &'static [OutputChannel] =
            &[OutputChannel::new(ChannelRole::Diffuse, 0)];
        const SHADER_DEF: Option<&'static str> = None;
    }

    #[test]
    fn test_sizes_have_no_padding() {
        assert_eq!(size_of::<GBufferOutput>(), 3 * 16);
        assert_eq!(size_of::<ScreenGBufferOutput>(), 4 * 16);
        assert_eq!(validate_layout::<GBufferOutput>(), Ok(()));
        assert_eq!(validate_layout::<ScreenGBufferOutput>(), Ok(()));
    }

    #[test]
    fn test_declaration_order_matches_attachments() {
        let names: Vec<_> = GBufferOutput::CHANNELS.iter().map(|c| c.name()).collect();
        assert_eq!(names, ["diffuse", "normal", "light"]);

        let names: Vec<_> = ScreenGBufferOutput::CHANNELS
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(names, ["output", "diffuse", "normal", "light"]);

        for channels in [GBufferOutput::CHANNELS, ScreenGBufferOutput::CHANNELS] {
            for pair in channels.windows(2) {
                assert_eq!(pair[1].attachment, pair[0].attachment + 1);
            }
            assert_eq!(channels[0].attachment, 0);
        }
    }

    #[test]
    fn test_frag_output_is_gbuffer_output() {
        assert!(same_layout::<GBufferOutput, FragOutput>());
        assert!(same_layout::<GBufferOutput, MirroredOutput>());
        assert!(!same_layout::<GBufferOutput, ScreenGBufferOutput>());
    }

    #[test]
    fn test_screen_layout_shifts_gbuffer_channels() {
        assert_eq!(
            ScreenGBufferOutput::attachment_count(),
            GBufferOutput::attachment_count() + 1
        );
        assert_eq!(ScreenGBufferOutput::CHANNELS[0].role, ChannelRole::Output);
        assert_eq!(GBufferOutput::attachment_for(ChannelRole::Output), None);

        for channel in GBufferOutput::CHANNELS {
            assert_eq!(
                ScreenGBufferOutput::attachment_for(channel.role),
                Some(channel.attachment + 1),
                "{} should move up one slot",
                channel.name()
            );
        }
    }

    #[test]
    fn test_screen_output_attachment_bytes() {
        let out = ScreenGBufferOutput {
            output: [1.0, 1.0, 1.0, 1.0],
            diffuse: [0.2, 0.2, 0.2, 1.0],
            normal: [0.0, 0.0, 1.0, 0.0],
            light: [0.5, 0.5, 0.5, 1.0],
        };

        let slot0: &[f32] = bytemuck::cast_slice(out.attachment_bytes(0).unwrap());
        let slot3: &[f32] = bytemuck::cast_slice(out.attachment_bytes(3).unwrap());
        assert_eq!(slot0, &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(slot3, &[0.5, 0.5, 0.5, 1.0]);

        assert_eq!(out.attachment(2), Some([0.0, 0.0, 1.0, 0.0]));
        assert_eq!(out.attachment(4), None);
        assert!(out.attachment_bytes(4).is_none());
    }

    #[test]
    fn test_screen_output_wraps_gbuffer() {
        let gbuffer = GBufferOutput {
            diffuse: [0.3, 0.4, 0.5, 1.0],
            normal: [0.5, 0.5, 1.0, 1.0],
            light: [0.0; 4],
        };
        let screen = ScreenGBufferOutput::from_gbuffer([0.3, 0.4, 0.5, 1.0], gbuffer);

        assert_eq!(screen.gbuffer(), gbuffer);
        assert_eq!(&screen.attachments()[1..], gbuffer.attachments());
    }

    #[test]
    fn test_invalid_layouts_rejected() {
        assert_eq!(
            validate_layout::<SwappedOutput>(),
            Err(LayoutError::NonContiguous {
                position: 0,
                attachment: 1
            })
        );
        assert_eq!(
            validate_layout::<PaddedOutput>(),
            Err(LayoutError::SizeMismatch {
                expected: 16,
                actual: 32
            })
        );
    }

    #[test]
    fn test_wgsl_struct() {
        let source = wgsl_struct::<GBufferOutput>("FragOutput");
        assert_eq!(
            source,
            "struct FragOutput {\n    @location(0) diffuse: vec4<f32>,\n    @location(1) normal: vec4<f32>,\n    @location(2) light: vec4<f32>,\n}"
        );
        assert!(wgsl_struct::<ScreenGBufferOutput>("FragOutput")
            .contains("@location(3) light: vec4<f32>,"));
    }
}
