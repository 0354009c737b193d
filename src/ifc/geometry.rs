use std::collections::{BTreeMap, HashMap};

use glam::{DMat4, DVec2, DVec3, Vec4};
use log::debug;

use super::step::{Entity, StepFile, Value};
use crate::mesh::MeshData;
use crate::scene::MeshPart;

/// Guards against reference cycles in malformed files.
const MAX_DEPTH: usize = 32;
const CIRCLE_SEGMENTS: usize = 24;

const NEUTRAL_GREY: Vec4 = Vec4::new(0.8, 0.8, 0.8, 1.0);
const GLAZING: Vec4 = Vec4::new(0.55, 0.75, 0.9, 0.4);

/// Representations that describe annotations or simplified stand-ins of the body.
const NON_BODY_REPRESENTATIONS: &[&str] = &["Axis", "FootPrint", "Box", "Annotation", "Profile", "Reference"];

/// Turns the products of a parsed IFC file into coloured meshes.
pub(super) struct GeometryBuilder<'a> {
    file: &'a StepFile,
    length_scale: f64,
    styles: HashMap<u64, Vec4>,
    placements: HashMap<u64, DMat4>,
    unsupported: BTreeMap<String, usize>,
}

impl<'a> GeometryBuilder<'a> {
    pub fn new(file: &'a StepFile) -> Self {
        let length_scale = length_unit_scale(file);
        debug!("length unit scale to metres: {length_scale}");
        Self {
            file,
            length_scale,
            styles: collect_styles(file),
            placements: HashMap::new(),
            unsupported: BTreeMap::new(),
        }
    }

    /// One part per product and colour, in entity id order.
    pub fn build_parts(&mut self, skipped_types: &[String]) -> Vec<MeshPart> {
        let file = self.file;
        let mut products: Vec<&Entity> = file.entities().filter(|e| is_product(file, e)).collect();
        products.sort_by_key(|e| e.id);

        let mut parts = Vec::new();
        for product in products {
            if skipped_types.iter().any(|skipped| skipped.eq_ignore_ascii_case(&product.kind)) {
                continue;
            }
            parts.extend(self.product_parts(product));
        }
        for (kind, count) in &self.unsupported {
            debug!("ignored {count} unsupported representation item(s) of type {kind}");
        }
        parts
    }

    fn product_parts(&mut self, product: &Entity) -> Vec<MeshPart> {
        let file = self.file;
        let placement = self.object_placement(product.arg(5), 0);
        let label = match product.arg(2).as_str() {
            Some(name) if !name.is_empty() => format!("{} '{}'", product.kind, name),
            _ => format!("{} #{}", product.kind, product.id),
        };

        let mut sink = PartSink::default();
        if let Some(shape) = file.resolve(product.arg(6)) {
            for representation in body_representations(file, shape) {
                for item in representation.arg(3).as_list().unwrap_or_default() {
                    if let Some(id) = item.as_ref_id() {
                        self.add_item(id, &placement, None, 0, &mut sink);
                    }
                }
            }
        }

        let fallback = default_color(&product.kind);
        sink.groups
            .into_iter()
            .filter(|(_, mesh)| !mesh.is_empty())
            .map(|(color, mesh)| MeshPart {
                label: label.clone(),
                color: color.unwrap_or(fallback),
                mesh,
            })
            .collect()
    }

    fn add_item(&mut self, id: u64, transform: &DMat4, inherited: Option<Vec4>, depth: usize, sink: &mut PartSink) {
        let file = self.file;
        let Some(item) = file.get(id) else {
            return;
        };
        if depth > MAX_DEPTH {
            return;
        }
        let color = self.styles.get(&id).copied().or(inherited);

        match item.kind.as_str() {
            "IFCEXTRUDEDAREASOLID" => self.extruded_area_solid(item, transform, sink.mesh(color)),
            "IFCTRIANGULATEDFACESET" | "IFCTRIANGULATEDIRREGULARNETWORK" => {
                self.triangulated_face_set(item, transform, sink.mesh(color))
            }
            "IFCPOLYGONALFACESET" => self.polygonal_face_set(item, transform, sink.mesh(color)),
            "IFCFACETEDBREP" | "IFCFACETEDBREPWITHVOIDS" => {
                self.shell(item.arg(0), transform, depth, sink.mesh(color))
            }
            "IFCSHELLBASEDSURFACEMODEL" | "IFCFACEBASEDSURFACEMODEL" => {
                for shell in item.arg(0).as_list().unwrap_or_default() {
                    self.shell(shell, transform, depth, sink.mesh(color));
                }
            }
            "IFCMAPPEDITEM" => self.mapped_item(item, transform, color, depth, sink),
            "IFCBOOLEANRESULT" | "IFCBOOLEANCLIPPINGRESULT" => {
                // Only the first operand is drawn; subtraction is not evaluated.
                if let Some(first) = item.arg(1).as_ref_id() {
                    self.add_item(first, transform, color, depth + 1, sink);
                }
            }
            other => *self.unsupported.entry(other.to_owned()).or_default() += 1,
        }
    }

    fn mapped_item(&mut self, item: &Entity, transform: &DMat4, color: Option<Vec4>, depth: usize, sink: &mut PartSink) {
        let file = self.file;
        let Some(source) = file.resolve(item.arg(0)) else {
            return;
        };
        let origin = self.axis2_placement(source.arg(0));
        let target = self.transform_operator(item.arg(1));
        let mapped = *transform * target * origin;
        let Some(representation) = file.resolve(source.arg(1)) else {
            return;
        };
        for inner in representation.arg(3).as_list().unwrap_or_default() {
            if let Some(id) = inner.as_ref_id() {
                self.add_item(id, &mapped, color, depth + 1, sink);
            }
        }
    }

    fn extruded_area_solid(&self, item: &Entity, transform: &DMat4, mesh: &mut MeshData) {
        let Some(mut outline) = self.profile_outline(item.arg(0), 0) else {
            return;
        };
        let depth = item.arg(3).as_f64().unwrap_or(0.0) * self.length_scale;
        if outline.len() < 3 || depth <= 0.0 {
            return;
        }
        let direction = self.direction(item.arg(2)).unwrap_or(DVec3::Z);
        let transform = *transform * self.axis2_placement(item.arg(1));

        // Counter-clockwise outline with an upward sweep gives outward normals.
        if signed_area(&outline) < 0.0 {
            outline.reverse();
        }
        if direction.z < 0.0 {
            outline.reverse();
        }
        let sweep = direction * depth;
        let bottom: Vec<DVec3> = outline.iter().map(|p| p.extend(0.0)).collect();
        let top: Vec<DVec3> = bottom.iter().map(|p| *p + sweep).collect();

        let mut reversed_bottom = bottom.clone();
        reversed_bottom.reverse();
        emit_polygon(mesh, &transform, &reversed_bottom);
        emit_polygon(mesh, &transform, &top);
        for i in 0..bottom.len() {
            let j = (i + 1) % bottom.len();
            emit_polygon(mesh, &transform, &[bottom[i], bottom[j], top[j], top[i]]);
        }
    }

    fn triangulated_face_set(&self, item: &Entity, transform: &DMat4, mesh: &mut MeshData) {
        let points = self.point_list(item.arg(0));
        let pn_index = index_list(item.arg(4));
        for triangle in item.arg(3).as_list().unwrap_or_default() {
            let corners = resolve_indices(triangle, &points, pn_index.as_deref());
            if let [a, b, c] = corners[..] {
                emit_polygon(mesh, transform, &[a, b, c]);
            }
        }
    }

    fn polygonal_face_set(&self, item: &Entity, transform: &DMat4, mesh: &mut MeshData) {
        let file = self.file;
        let points = self.point_list(item.arg(0));
        let pn_index = index_list(item.arg(3));
        for face in item.arg(2).as_list().unwrap_or_default() {
            let Some(face) = file.resolve(face) else {
                continue;
            };
            // Inner loops of IfcIndexedPolygonalFaceWithVoids are not cut out.
            let corners = resolve_indices(face.arg(0), &points, pn_index.as_deref());
            emit_polygon(mesh, transform, &corners);
        }
    }

    fn shell(&self, shell: &Value, transform: &DMat4, depth: usize, mesh: &mut MeshData) {
        let file = self.file;
        let Some(shell) = file.resolve(shell) else {
            return;
        };
        if depth > MAX_DEPTH {
            return;
        }
        for face in shell.arg(0).as_list().unwrap_or_default() {
            let Some(face) = file.resolve(face) else {
                continue;
            };
            let bounds: Vec<&Entity> = face
                .arg(0)
                .as_list()
                .unwrap_or_default()
                .iter()
                .filter_map(|bound| file.resolve(bound))
                .collect();
            let outer = bounds
                .iter()
                .find(|bound| bound.kind == "IFCFACEOUTERBOUND")
                .or_else(|| bounds.first());
            let Some(outer) = outer else {
                continue;
            };
            let Some(face_loop) = file.resolve(outer.arg(0)) else {
                continue;
            };
            if face_loop.kind != "IFCPOLYLOOP" {
                continue;
            }
            let mut polygon: Vec<DVec3> = face_loop
                .arg(0)
                .as_list()
                .unwrap_or_default()
                .iter()
                .filter_map(|point| self.point(point))
                .collect();
            if outer.arg(1).as_enum() == Some("F") {
                polygon.reverse();
            }
            emit_polygon(mesh, transform, &polygon);
        }
    }

    /// Outer boundary of a profile in its own plane, in metres.
    fn profile_outline(&self, value: &Value, depth: usize) -> Option<Vec<DVec2>> {
        let file = self.file;
        let profile = file.resolve(value)?;
        let scale = self.length_scale;
        let dim = |index: usize| profile.arg(index).as_f64().map(|v| v * scale);

        let outline = match profile.kind.as_str() {
            "IFCRECTANGLEPROFILEDEF" | "IFCRECTANGLEHOLLOWPROFILEDEF" | "IFCROUNDEDRECTANGLEPROFILEDEF" => {
                let (hx, hy) = (dim(3)? / 2.0, dim(4)? / 2.0);
                vec![
                    DVec2::new(-hx, -hy),
                    DVec2::new(hx, -hy),
                    DVec2::new(hx, hy),
                    DVec2::new(-hx, hy),
                ]
            }
            "IFCCIRCLEPROFILEDEF" | "IFCCIRCLEHOLLOWPROFILEDEF" => {
                let radius = dim(3)?;
                (0..CIRCLE_SEGMENTS)
                    .map(|i| {
                        let angle = i as f64 / CIRCLE_SEGMENTS as f64 * std::f64::consts::TAU;
                        DVec2::new(angle.cos(), angle.sin()) * radius
                    })
                    .collect()
            }
            "IFCISHAPEPROFILEDEF" => {
                let (w, h) = (dim(3)? / 2.0, dim(4)? / 2.0);
                let (web, flange) = (dim(5)? / 2.0, dim(6)?);
                vec![
                    DVec2::new(-w, -h),
                    DVec2::new(w, -h),
                    DVec2::new(w, -h + flange),
                    DVec2::new(web, -h + flange),
                    DVec2::new(web, h - flange),
                    DVec2::new(w, h - flange),
                    DVec2::new(w, h),
                    DVec2::new(-w, h),
                    DVec2::new(-w, h - flange),
                    DVec2::new(-web, h - flange),
                    DVec2::new(-web, -h + flange),
                    DVec2::new(-w, -h + flange),
                ]
            }
            "IFCARBITRARYCLOSEDPROFILEDEF" | "IFCARBITRARYPROFILEDEFWITHVOIDS" => {
                return self.curve_points(profile.arg(2)).map(drop_closing_point);
            }
            "IFCDERIVEDPROFILEDEF" if depth < MAX_DEPTH => {
                let operator = self.transform_operator(profile.arg(3));
                let parent = self.profile_outline(profile.arg(2), depth + 1)?;
                return Some(
                    parent
                        .into_iter()
                        .map(|p| operator.transform_point3(p.extend(0.0)).truncate())
                        .collect(),
                );
            }
            other => {
                debug!("unsupported profile type {other}");
                return None;
            }
        };

        let position = self.axis2_placement(profile.arg(2));
        Some(
            outline
                .into_iter()
                .map(|p| position.transform_point3(p.extend(0.0)).truncate())
                .collect(),
        )
    }

    fn curve_points(&self, value: &Value) -> Option<Vec<DVec2>> {
        let file = self.file;
        let curve = file.resolve(value)?;
        match curve.kind.as_str() {
            "IFCPOLYLINE" => Some(
                curve
                    .arg(0)
                    .as_list()?
                    .iter()
                    .filter_map(|point| self.point(point))
                    .map(|p| p.truncate())
                    .collect(),
            ),
            // Arc segments are approximated by their control points.
            "IFCINDEXEDPOLYCURVE" => Some(self.point_list(curve.arg(0)).into_iter().map(|p| p.truncate()).collect()),
            other => {
                debug!("unsupported profile curve {other}");
                None
            }
        }
    }

    fn object_placement(&mut self, value: &Value, depth: usize) -> DMat4 {
        let file = self.file;
        let Some(placement) = file.resolve(value) else {
            return DMat4::IDENTITY;
        };
        if let Some(cached) = self.placements.get(&placement.id) {
            return *cached;
        }
        if placement.kind != "IFCLOCALPLACEMENT" || depth > MAX_DEPTH {
            return DMat4::IDENTITY;
        }
        let parent = self.object_placement(placement.arg(0), depth + 1);
        let matrix = parent * self.axis2_placement(placement.arg(1));
        self.placements.insert(placement.id, matrix);
        matrix
    }

    fn axis2_placement(&self, value: &Value) -> DMat4 {
        let file = self.file;
        let Some(placement) = file.resolve(value) else {
            return DMat4::IDENTITY;
        };
        let origin = self.point(placement.arg(0)).unwrap_or(DVec3::ZERO);
        match placement.kind.as_str() {
            "IFCAXIS2PLACEMENT3D" => {
                let z = self.direction(placement.arg(1)).unwrap_or(DVec3::Z);
                let x = self.direction(placement.arg(2)).unwrap_or(DVec3::X);
                basis(z, x, origin)
            }
            "IFCAXIS2PLACEMENT2D" => {
                let x = self.direction(placement.arg(1)).unwrap_or(DVec3::X);
                basis(DVec3::Z, x, origin)
            }
            _ => DMat4::from_translation(origin),
        }
    }

    fn transform_operator(&self, value: &Value) -> DMat4 {
        let file = self.file;
        let Some(operator) = file.resolve(value) else {
            return DMat4::IDENTITY;
        };
        let x = self.direction(operator.arg(0)).unwrap_or(DVec3::X);
        let origin = self.point(operator.arg(2)).unwrap_or(DVec3::ZERO);
        let scale = operator.arg(3).as_f64().unwrap_or(1.0);
        let (z, scale2, scale3) = match operator.kind.as_str() {
            "IFCCARTESIANTRANSFORMATIONOPERATOR3D" => {
                (self.direction(operator.arg(4)).unwrap_or(DVec3::Z), scale, scale)
            }
            "IFCCARTESIANTRANSFORMATIONOPERATOR3DNONUNIFORM" => (
                self.direction(operator.arg(4)).unwrap_or(DVec3::Z),
                operator.arg(5).as_f64().unwrap_or(scale),
                operator.arg(6).as_f64().unwrap_or(scale),
            ),
            _ => (DVec3::Z, scale, 1.0),
        };
        basis(z, x, origin) * DMat4::from_scale(DVec3::new(scale, scale2, scale3))
    }

    /// `IfcCartesianPoint` in metres; 2D points get `z = 0`.
    fn point(&self, value: &Value) -> Option<DVec3> {
        let point = self.file.resolve(value)?;
        if point.kind != "IFCCARTESIANPOINT" {
            return None;
        }
        coordinates(point.arg(0)).map(|p| p * self.length_scale)
    }

    fn direction(&self, value: &Value) -> Option<DVec3> {
        let direction = self.file.resolve(value)?;
        if direction.kind != "IFCDIRECTION" {
            return None;
        }
        coordinates(direction.arg(0))?.try_normalize()
    }

    /// Points of an `IfcCartesianPointList2D/3D` in metres.
    fn point_list(&self, value: &Value) -> Vec<DVec3> {
        let Some(list) = self.file.resolve(value) else {
            return Vec::new();
        };
        list.arg(0)
            .as_list()
            .unwrap_or_default()
            .iter()
            .map(|coords| coordinates(coords).unwrap_or(DVec3::ZERO) * self.length_scale)
            .collect()
    }
}

#[derive(Default)]
struct PartSink {
    groups: Vec<(Option<Vec4>, MeshData)>,
}

impl PartSink {
    fn mesh(&mut self, color: Option<Vec4>) -> &mut MeshData {
        let index = match self.groups.iter().position(|(c, _)| *c == color) {
            Some(index) => index,
            None => {
                self.groups.push((color, MeshData::new()));
                self.groups.len() - 1
            }
        };
        &mut self.groups[index].1
    }
}

fn is_product(file: &StepFile, entity: &Entity) -> bool {
    entity.args.len() >= 7
        && file
            .resolve(entity.arg(6))
            .is_some_and(|shape| shape.kind == "IFCPRODUCTDEFINITIONSHAPE")
}

fn body_representations<'f>(file: &'f StepFile, shape: &'f Entity) -> Vec<&'f Entity> {
    let representations: Vec<&Entity> = shape
        .arg(2)
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(|rep| file.resolve(rep))
        .filter(|rep| rep.kind == "IFCSHAPEREPRESENTATION")
        .filter(|rep| {
            !rep.arg(1)
                .as_str()
                .is_some_and(|id| NON_BODY_REPRESENTATIONS.iter().any(|skip| skip.eq_ignore_ascii_case(id)))
        })
        .collect();
    if representations.iter().any(|rep| rep.arg(1).as_str() == Some("Body")) {
        representations
            .into_iter()
            .filter(|rep| rep.arg(1).as_str() == Some("Body"))
            .collect()
    } else {
        representations
    }
}

fn default_color(kind: &str) -> Vec4 {
    match kind {
        "IFCWINDOW" | "IFCCURTAINWALL" => GLAZING,
        _ => NEUTRAL_GREY,
    }
}

fn coordinates(value: &Value) -> Option<DVec3> {
    let list = value.as_list()?;
    let component = |i: usize| list.get(i).and_then(Value::as_f64);
    Some(DVec3::new(component(0)?, component(1)?, component(2).unwrap_or(0.0)))
}

fn index_list(value: &Value) -> Option<Vec<usize>> {
    let list = value.as_list()?;
    Some(list.iter().filter_map(|v| v.as_i64()).map(|i| i.max(0) as usize).collect())
}

/// Maps 1-based coordinate indices, optionally through `PnIndex`, to points.
fn resolve_indices(indices: &Value, points: &[DVec3], pn_index: Option<&[usize]>) -> Vec<DVec3> {
    indices
        .as_list()
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_i64)
        .filter_map(|index| {
            let index = usize::try_from(index).ok()?.checked_sub(1)?;
            let index = match pn_index {
                Some(pn) => pn.get(index)?.checked_sub(1)?,
                None => index,
            };
            points.get(index).copied()
        })
        .collect()
}

fn basis(z: DVec3, x_hint: DVec3, origin: DVec3) -> DMat4 {
    let z = z.try_normalize().unwrap_or(DVec3::Z);
    let x = (x_hint - z * x_hint.dot(z))
        .try_normalize()
        .unwrap_or_else(|| z.any_orthonormal_vector());
    let y = z.cross(x);
    DMat4::from_cols(x.extend(0.0), y.extend(0.0), z.extend(0.0), origin.extend(1.0))
}

fn signed_area(points: &[DVec2]) -> f64 {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| p.perp_dot(points[(i + 1) % points.len()]))
        .sum::<f64>()
        * 0.5
}

fn drop_closing_point(mut points: Vec<DVec2>) -> Vec<DVec2> {
    if points.len() > 1 && points.first().zip(points.last()).is_some_and(|(a, b)| a.distance_squared(*b) < 1e-18) {
        points.pop();
    }
    points
}

fn emit_polygon(mesh: &mut MeshData, transform: &DMat4, points: &[DVec3]) {
    if points.len() < 3 {
        return;
    }
    let world: Vec<glam::Vec3> = points
        .iter()
        .map(|p| transform.transform_point3(*p).as_vec3())
        .collect();
    mesh.push_polygon(&world);
}

/// Factor converting the file's length unit to metres.
fn length_unit_scale(file: &StepFile) -> f64 {
    let assigned: Vec<&Entity> = file
        .entities_of_kind("IFCUNITASSIGNMENT")
        .first()
        .and_then(|assignment| assignment.arg(0).as_list())
        .map(|units| units.iter().filter_map(|unit| file.resolve(unit)).collect())
        .unwrap_or_default();
    let candidates = if assigned.is_empty() {
        let mut all = file.entities_of_kind("IFCSIUNIT");
        all.extend(file.entities_of_kind("IFCCONVERSIONBASEDUNIT"));
        all
    } else {
        assigned
    };
    candidates
        .into_iter()
        .filter(|unit| unit.arg(1).as_enum() == Some("LENGTHUNIT"))
        .find_map(|unit| unit_scale(file, unit, 0))
        .unwrap_or(1.0)
}

fn unit_scale(file: &StepFile, unit: &Entity, depth: usize) -> Option<f64> {
    match unit.kind.as_str() {
        "IFCSIUNIT" => Some(si_prefix(unit.arg(2).as_enum())),
        "IFCCONVERSIONBASEDUNIT" if depth < MAX_DEPTH => {
            let measure = file.resolve(unit.arg(3))?;
            let value = measure.arg(0).as_f64()?;
            let base = file
                .resolve(measure.arg(1))
                .and_then(|base| unit_scale(file, base, depth + 1))
                .unwrap_or(1.0);
            Some(value * base)
        }
        _ => None,
    }
}

fn si_prefix(prefix: Option<&str>) -> f64 {
    match prefix {
        Some("KILO") => 1e3,
        Some("HECTO") => 1e2,
        Some("DECA") => 1e1,
        Some("DECI") => 1e-1,
        Some("CENTI") => 1e-2,
        Some("MILLI") => 1e-3,
        Some("MICRO") => 1e-6,
        Some("NANO") => 1e-9,
        _ => 1.0,
    }
}

/// Colour of every styled representation item, keyed by item id.
fn collect_styles(file: &StepFile) -> HashMap<u64, Vec4> {
    file.entities_of_kind("IFCSTYLEDITEM")
        .into_iter()
        .filter_map(|styled| {
            let item = styled.arg(0).as_ref_id()?;
            let color = style_color(file, styled.arg(1), 0)?;
            Some((item, color))
        })
        .collect()
}

fn style_color(file: &StepFile, value: &Value, depth: usize) -> Option<Vec4> {
    if depth > 8 {
        return None;
    }
    if let Some(list) = value.as_list() {
        return list.iter().find_map(|v| style_color(file, v, depth + 1));
    }
    let style = file.resolve(value)?;
    match style.kind.as_str() {
        "IFCPRESENTATIONSTYLEASSIGNMENT" => style_color(file, style.arg(0), depth + 1),
        "IFCSURFACESTYLE" => style_color(file, style.arg(2), depth + 1),
        "IFCSURFACESTYLERENDERING" | "IFCSURFACESTYLESHADING" => {
            let rgb = file.resolve(style.arg(0)).and_then(colour_rgb)?;
            let transparency = style.arg(1).as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
            Some(rgb.extend(1.0 - transparency as f32))
        }
        "IFCCOLOURRGB" => colour_rgb(style).map(|rgb| rgb.extend(1.0)),
        _ => None,
    }
}

fn colour_rgb(colour: &Entity) -> Option<glam::Vec3> {
    if colour.kind != "IFCCOLOURRGB" {
        return None;
    }
    let channel = |i: usize| colour.arg(i).as_f64().map(|v| v.clamp(0.0, 1.0) as f32);
    Some(glam::Vec3::new(channel(1)?, channel(2)?, channel(3)?))
}
