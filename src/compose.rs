use crate::canvas::{Canvas, GlyphMetrics, GlyphPlacement};
use crate::glyph::{normalize_for_vertical, normalize_postal_code};
use crate::layout_spec::{LayoutSpec, RegionSpec};
use crate::model::{AddressRecord, SenderProfile};
use crate::postal;
use crate::vertical::{self, fit_font_size, run_height};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    RecipientPostal,
    RecipientAddress1,
    RecipientAddress2,
    RecipientName,
    /// Joint-name column `n`, 0 being nearest the main name.
    JointName(usize),
    SenderPostal,
    SenderAddress1,
    SenderAddress2,
    SenderName,
}

impl Region {
    pub fn label(&self) -> String {
        match self {
            Region::RecipientPostal => "recipient_postal".to_string(),
            Region::RecipientAddress1 => "recipient_address1".to_string(),
            Region::RecipientAddress2 => "recipient_address2".to_string(),
            Region::RecipientName => "recipient_name".to_string(),
            Region::JointName(index) => format!("joint_name_{index}"),
            Region::SenderPostal => "sender_postal".to_string(),
            Region::SenderAddress1 => "sender_address1".to_string(),
            Region::SenderAddress2 => "sender_address2".to_string(),
            Region::SenderName => "sender_name".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionPlan {
    pub region: Region,
    /// Column anchor the region was laid out on.
    pub anchor_x: f64,
    /// Effective font size after any shrink-to-fit.
    pub font_size: f64,
    pub placements: Vec<GlyphPlacement>,
}

/// Every placement of one card, grouped by region in drawing order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PagePlan {
    pub regions: Vec<RegionPlan>,
}

impl PagePlan {
    pub fn region(&self, region: Region) -> Option<&RegionPlan> {
        self.regions.iter().find(|plan| plan.region == region)
    }

    pub fn placements(&self) -> impl Iterator<Item = &GlyphPlacement> {
        self.regions.iter().flat_map(|plan| plan.placements.iter())
    }

    pub fn glyph_count(&self) -> usize {
        self.regions.iter().map(|plan| plan.placements.len()).sum()
    }

    /// Glyphs drawn without centering because the canvas could not measure
    /// them.
    pub fn unmeasured(&self) -> Vec<char> {
        self.placements()
            .filter(|p| !p.measured)
            .map(|p| p.ch)
            .collect()
    }
}

/// Turns one address plus the sender into a page of placements. Stateless:
/// every call depends only on its inputs and the layout table.
#[derive(Debug, Clone)]
pub struct PageComposer {
    layout: LayoutSpec,
}

impl PageComposer {
    pub fn new(layout: LayoutSpec) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &LayoutSpec {
        &self.layout
    }

    pub fn compose<M: GlyphMetrics + ?Sized>(
        &self,
        address: &AddressRecord,
        sender: &SenderProfile,
        metrics: &M,
    ) -> PagePlan {
        let spec = &self.layout;
        let mut plan = PagePlan::default();

        let recipient_postal = normalize_postal_code(&address.postal_code);
        plan.regions.push(RegionPlan {
            region: Region::RecipientPostal,
            anchor_x: spec.recipient_postal.x[0],
            font_size: spec.recipient_postal.font_size,
            placements: postal::layout(&recipient_postal, &spec.recipient_postal, metrics),
        });

        plan.regions.push(address_line(
            Region::RecipientAddress1,
            &address.address1,
            &spec.recipient_address1,
            metrics,
        ));
        if let Some(line) = address.address2.as_deref().filter(|line| !line.is_empty()) {
            plan.regions.push(address_line(
                Region::RecipientAddress2,
                line,
                &spec.recipient_address2,
                metrics,
            ));
        }

        self.compose_name_block(address, metrics, &mut plan);

        let sender_postal = normalize_postal_code(&sender.postal_code);
        plan.regions.push(RegionPlan {
            region: Region::SenderPostal,
            anchor_x: spec.sender_postal.x[0],
            font_size: spec.sender_postal.font_size,
            placements: postal::layout(&sender_postal, &spec.sender_postal, metrics),
        });

        plan.regions.push(address_line(
            Region::SenderAddress1,
            &sender.address1,
            &spec.sender_address1,
            metrics,
        ));
        if let Some(line) = sender.address2() {
            plan.regions.push(address_line(
                Region::SenderAddress2,
                line,
                &spec.sender_address2,
                metrics,
            ));
        }

        // Sender name is never shrunk; it only truncates at the limit.
        let name = sender.full_name();
        let region = &spec.sender_name;
        plan.regions.push(RegionPlan {
            region: Region::SenderName,
            anchor_x: region.x,
            font_size: region.font_size,
            placements: vertical::layout(
                &name,
                region.x,
                region.start_y,
                region.font_size,
                region.limit_y,
                metrics,
            )
            .collect(),
        });

        plan
    }

    /// Family name, given name and honorific as one run, then one column per
    /// joint name to the left.
    fn compose_name_block<M: GlyphMetrics + ?Sized>(
        &self,
        address: &AddressRecord,
        metrics: &M,
        plan: &mut PagePlan,
    ) {
        let block = &self.layout.recipient_name;
        let region = &block.region;
        let honorific = address.honorific.as_str();
        let family_len = address.family_name.chars().count();
        let given_len = address.given_name.chars().count();
        let full_len = family_len + given_len + honorific.chars().count();

        let available = region.available_height();
        let font_size = fit_font_size(full_len, region.font_size, available);

        // Slack is split 1:3 above and below, not centred.
        let mut start_y = region.start_y;
        let total = run_height(full_len, font_size);
        if total < available {
            start_y += (available - total) / 4.0;
        }

        let joint_count = address.joint_names.len();
        let mut x = region.x;
        if joint_count > 0 {
            x += joint_count as f64 * block.joint_pitch / 2.0;
        }

        let given_y = start_y + run_height(family_len, font_size);
        let honorific_y = given_y + run_height(given_len, font_size);
        let mut placements: Vec<GlyphPlacement> = Vec::with_capacity(full_len);
        for (text, y) in [
            (address.family_name.as_str(), start_y),
            (address.given_name.as_str(), given_y),
            (honorific, honorific_y),
        ] {
            placements.extend(vertical::layout(
                text,
                x,
                y,
                font_size,
                region.limit_y,
                metrics,
            ));
        }
        plan.regions.push(RegionPlan {
            region: Region::RecipientName,
            anchor_x: x,
            font_size,
            placements,
        });

        let joint_span = region.limit_y - given_y;
        for (index, joint) in address.joint_names.iter().enumerate() {
            let joint_x = x - (index + 1) as f64 * block.joint_pitch;
            let joint_len = joint.chars().count();
            let joint_size = fit_font_size(joint_len + honorific.chars().count(), font_size, joint_span);
            let joint_honorific_y = given_y + run_height(joint_len, joint_size);

            let mut placements: Vec<GlyphPlacement> = vertical::layout(
                joint,
                joint_x,
                given_y,
                joint_size,
                region.limit_y,
                metrics,
            )
            .collect();
            placements.extend(vertical::layout(
                honorific,
                joint_x,
                joint_honorific_y,
                joint_size,
                region.limit_y,
                metrics,
            ));
            plan.regions.push(RegionPlan {
                region: Region::JointName(index),
                anchor_x: joint_x,
                font_size: joint_size,
                placements,
            });
        }
    }

    /// Starts a page on `canvas` and draws `plan` onto it.
    pub fn draw<C: Canvas + ?Sized>(&self, canvas: &mut C, plan: &PagePlan) {
        canvas.begin_page(self.layout.page_width, self.layout.page_height);
        for placement in plan.placements() {
            canvas.draw_glyph(placement);
        }
    }

    pub fn render_page<C: Canvas + ?Sized>(
        &self,
        canvas: &mut C,
        address: &AddressRecord,
        sender: &SenderProfile,
    ) -> PagePlan {
        let plan = self.compose(address, sender, &*canvas);
        self.draw(canvas, &plan);
        plan
    }
}

fn address_line<M: GlyphMetrics + ?Sized>(
    region_kind: Region,
    text: &str,
    region: &RegionSpec,
    metrics: &M,
) -> RegionPlan {
    let text = normalize_for_vertical(text);
    RegionPlan {
        region: region_kind,
        anchor_x: region.x,
        font_size: region.font_size,
        placements: vertical::layout(
            &text,
            region.x,
            region.start_y,
            region.font_size,
            region.limit_y,
            metrics,
        )
        .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::MemoryCanvas;
    use crate::vertical::line_pitch;

    fn yamada() -> AddressRecord {
        AddressRecord::new("山田", "太郎")
            .with_postal_code("1000001")
            .with_address("東京都千代田区1-1", None)
    }

    fn suzuki() -> SenderProfile {
        SenderProfile {
            family_name: "鈴木".to_string(),
            given_name: "花子".to_string(),
            postal_code: "160-0022".to_string(),
            address1: "東京都新宿区2-2".to_string(),
            address2: String::new(),
        }
    }

    fn chars(plan: &RegionPlan) -> String {
        plan.placements.iter().map(|p| p.ch).collect()
    }

    #[test]
    fn regions_follow_drawing_order() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let plan = composer.compose(&yamada(), &suzuki(), &MemoryCanvas::new());
        let order: Vec<Region> = plan.regions.iter().map(|r| r.region).collect();
        assert_eq!(
            order,
            vec![
                Region::RecipientPostal,
                Region::RecipientAddress1,
                Region::RecipientName,
                Region::SenderPostal,
                Region::SenderAddress1,
                Region::SenderName,
            ]
        );
    }

    #[test]
    fn address_lines_are_normalized_but_names_are_not() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let sender = SenderProfile {
            given_name: "1号".to_string(),
            ..suzuki()
        };
        let plan = composer.compose(&yamada(), &sender, &MemoryCanvas::new());
        let line = plan.region(Region::RecipientAddress1).unwrap();
        assert_eq!(chars(line), "東京都千代田区１ー１");
        assert!(line.placements[8].rotated);
        assert_eq!(chars(plan.region(Region::SenderName).unwrap()), "鈴木1号");
    }

    #[test]
    fn short_name_keeps_base_size_and_is_top_weighted() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let plan = composer.compose(&yamada(), &suzuki(), &MemoryCanvas::new());
        let name = plan.region(Region::RecipientName).unwrap();
        assert_eq!(name.font_size, 18.0);
        assert_eq!(chars(name), "山田太郎様");

        let total = run_height(5, 18.0);
        let expected_start = 32.0 + (93.0 - total) / 4.0;
        assert!((name.placements[0].y - expected_start).abs() < 1e-9);
        for pair in name.placements.windows(2) {
            assert!(pair[1].y > pair[0].y);
            assert!((pair[1].y - pair[0].y - line_pitch(18.0)).abs() < 1e-9);
        }
    }

    #[test]
    fn long_name_shrinks_to_fill_the_region() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let address = AddressRecord::new("勅使河原小比類巻", "左衛門三郎之助太郎丸")
            .with_honorific("御中様");
        let plan = composer.compose(&address, &suzuki(), &MemoryCanvas::new());
        let name = plan.region(Region::RecipientName).unwrap();
        let expected = 93.0 / (21.0 * 0.3528 * 1.3);
        assert!((name.font_size - expected).abs() < 1e-6);
        assert!((name.placements[0].y - 32.0).abs() < 1e-9);
        let pitch = line_pitch(name.font_size);
        assert!(name.placements.iter().all(|p| p.y - p.dy + pitch <= 125.0));
    }

    #[test]
    fn no_name_cell_crosses_the_limit() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let canvas = MemoryCanvas::new();
        for family in 1..=20 {
            for given in 1..=20 {
                for honorific in 1..=4 {
                    let address = AddressRecord::new("一".repeat(family), "二".repeat(given))
                        .with_honorific("様".repeat(honorific))
                        .with_joint_names(vec!["三".repeat(given)]);
                    let plan = composer.compose(&address, &suzuki(), &canvas);
                    for region in plan
                        .regions
                        .iter()
                        .filter(|r| matches!(r.region, Region::RecipientName | Region::JointName(_)))
                    {
                        let pitch = line_pitch(region.font_size);
                        for p in &region.placements {
                            assert!(
                                p.y + pitch <= 125.0,
                                "{family}/{given}/{honorific}: {} at {}",
                                p.ch,
                                p.y + pitch
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn joint_names_stack_to_the_left() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let address = yamada().with_joint_names(vec!["一郎".to_string(), "次郎".to_string()]);
        let plan = composer.compose(&address, &suzuki(), &MemoryCanvas::new());

        let primary = plan.region(Region::RecipientName).unwrap();
        assert!((primary.anchor_x - (56.0 + 2.0 * 9.0 / 2.0)).abs() < 1e-9);

        let given_y = primary.placements[2].y;
        for index in 0..2 {
            let joint = plan.region(Region::JointName(index)).unwrap();
            let expected_x = primary.anchor_x - (index + 1) as f64 * 9.0;
            assert!((joint.anchor_x - expected_x).abs() < 1e-9);
            assert_eq!(joint.placements[0].y, given_y);
            assert_eq!(joint.placements.last().unwrap().ch, '様');
            for p in &joint.placements {
                assert!((p.column_center_x() - expected_x).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn joint_columns_shrink_against_the_remaining_span() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let address = yamada().with_joint_names(vec![
            "一".to_string(),
            "寿限無寿限無五劫の擦り切れ海砂利水魚".to_string(),
        ]);
        let plan = composer.compose(&address, &suzuki(), &MemoryCanvas::new());
        let primary = plan.region(Region::RecipientName).unwrap();
        let given_y = primary.placements[2].y;
        let span = 125.0 - given_y;

        let short = plan.region(Region::JointName(0)).unwrap();
        assert_eq!(short.font_size, primary.font_size);

        let long = plan.region(Region::JointName(1)).unwrap();
        let expected = span / (19.0 * 0.3528 * 1.3);
        assert!((long.font_size - expected).abs() < 1e-6);
        assert!(long.font_size < primary.font_size);
    }

    #[test]
    fn optional_lines_are_skipped_when_absent() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let address = yamada().with_address("東京都", Some("ハイツ101".to_string()));
        let sender = SenderProfile {
            address2: "コーポ2F".to_string(),
            ..suzuki()
        };
        let plan = composer.compose(&address, &sender, &MemoryCanvas::new());
        let line2 = plan.region(Region::RecipientAddress2).unwrap();
        assert_eq!(line2.font_size, 9.5);
        assert_eq!(line2.placements[0].y, 32.0);
        assert!(plan.region(Region::SenderAddress2).is_some());

        let plan = composer.compose(&yamada(), &suzuki(), &MemoryCanvas::new());
        assert!(plan.region(Region::RecipientAddress2).is_none());
        assert!(plan.region(Region::SenderAddress2).is_none());
    }

    #[test]
    fn sender_postal_is_normalized_before_placement() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let sender = SenderProfile {
            postal_code: "〒１６０ー００２２".to_string(),
            ..suzuki()
        };
        let plan = composer.compose(&yamada(), &sender, &MemoryCanvas::new());
        assert_eq!(chars(plan.region(Region::SenderPostal).unwrap()), "1600022");
    }

    #[test]
    fn render_page_draws_every_placement_on_a_new_page() {
        let composer = PageComposer::new(LayoutSpec::hagaki());
        let mut canvas = MemoryCanvas::new();
        let first = composer.render_page(&mut canvas, &yamada(), &suzuki());
        let second = composer.render_page(&mut canvas, &yamada(), &suzuki());
        assert_eq!(first, second);
        assert_eq!(canvas.pages.len(), 2);
        assert_eq!(canvas.pages[0].len(), first.glyph_count());
    }
}
