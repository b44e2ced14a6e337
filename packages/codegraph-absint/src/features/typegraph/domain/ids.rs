//! Arena ids

define_index!(
    /// CFG node; equal to the petgraph `NodeIndex` and to creation order
    CfgNodeId,
    "n"
);

define_index!(
    /// Variable slot in the program arena
    VariableId,
    "v"
);

define_index!(
    /// Binding slot in the program arena
    BindingId,
    "b"
);

define_index!(
    /// Opaque handle to the abstract value a binding carries
    ValueId,
    "d"
);
